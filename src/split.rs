//! パイプでトークン列を分割
use crate::{
    error::PipelineError,
    token::{TokenSeq, PIPE},
};

/// パイプで分割したコマンド列。必ず1つ以上のステージを持ち、
/// 各ステージは空ではなく"|"を含まない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<TokenSeq>,
}

impl Pipeline {
    /// トークン列をパイプで分割。
    ///
    /// 入力`echo hi | wc -l`に対して、`[["echo", "hi"], ["wc", "-l"]]`を返す。
    ///
    /// 先頭・末尾の"|"や連続した"|"は空のステージとなり、エラーとする。
    pub fn parse(tokens: &TokenSeq) -> Result<Self, PipelineError> {
        if tokens.is_empty() {
            return Err(PipelineError::EmptyLine);
        }

        let n = tokens.count(PIPE) + 1;
        let mut stages = Vec::with_capacity(n);
        let mut start = 0; // 次のステージの先頭

        while let Some(end) = tokens.find_from(start, PIPE) {
            stages.push(stage(tokens, start, end, stages.len())?);
            start = end + 1;
        }
        stages.push(stage(tokens, start, tokens.len(), stages.len())?);

        debug_assert_eq!(n, stages.len());
        Ok(Pipeline { stages })
    }

    /// ステージ数
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[TokenSeq] {
        &self.stages
    }
}

/// [start, end)をi番目のステージとして切り出す
fn stage(tokens: &TokenSeq, start: usize, end: usize, i: usize) -> Result<TokenSeq, PipelineError> {
    if start == end {
        return Err(PipelineError::EmptyCommand(i));
    }
    tokens.slice(start, end)
}
