//! トークン列
use crate::error::PipelineError;
use std::{fmt, slice::Iter};

/// パイプを表すトークン
pub const PIPE: &str = "|";

/// 単独のトークンとして切り出す演算子
const OPERATORS: [char; 3] = ['|', '<', '>'];

/// 1行分のコマンドラインを分割したトークン列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSeq {
    tokens: Vec<String>,
}

impl TokenSeq {
    pub fn new(tokens: Vec<String>) -> Self {
        TokenSeq { tokens }
    }

    /// 空白で分割し、演算子は前後に空白がなくても単独のトークンとする。
    /// クォートや展開には対応しない。
    ///
    /// 入力"ls -l|wc"に対して、`["ls", "-l", "|", "wc"]`を返す。
    pub fn tokenize(line: &str) -> Self {
        let mut tokens = Vec::new();
        for word in line.split_whitespace() {
            let mut cur = String::new();
            for c in word.chars() {
                if OPERATORS.contains(&c) {
                    if !cur.is_empty() {
                        tokens.push(std::mem::take(&mut cur));
                    }
                    tokens.push(c.to_string());
                } else {
                    cur.push(c);
                }
            }
            if !cur.is_empty() {
                tokens.push(cur);
            }
        }
        TokenSeq { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        self.tokens.get(i).map(|s| s.as_str())
    }

    /// tokと等しいトークンの出現回数
    pub fn count(&self, tok: &str) -> usize {
        self.tokens.iter().filter(|t| *t == tok).count()
    }

    /// tokと等しい最初のトークンの位置
    pub fn find(&self, tok: &str) -> Option<usize> {
        self.find_from(0, tok)
    }

    /// start以降でtokと等しい最初のトークンの位置
    pub fn find_from(&self, start: usize, tok: &str) -> Option<usize> {
        self.tokens
            .get(start..)?
            .iter()
            .position(|t| t == tok)
            .map(|i| i + start)
    }

    /// [start, end)の範囲を複製した新しいトークン列を返す
    pub fn slice(&self, start: usize, end: usize) -> Result<TokenSeq, PipelineError> {
        match self.tokens.get(start..end) {
            Some(s) => Ok(TokenSeq {
                tokens: s.to_vec(),
            }),
            None => Err(PipelineError::Slice {
                start,
                end,
                len: self.len(),
            }),
        }
    }

    pub fn iter(&self) -> Iter<'_, String> {
        self.tokens.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for TokenSeq {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        TokenSeq {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TokenSeq {
    type Item = &'a String;
    type IntoIter = Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

impl fmt::Display for TokenSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}
