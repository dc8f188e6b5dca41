//! パイプライン実行時のエラー
use crate::pipes::EndpointState;
use nix::errno::Errno;
use thiserror::Error;

/// エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,   // コマンドラインの構文エラー
    Resource, // pipe、forkの失敗
    Wiring,   // dup2、closeの失敗
    Exec,     // コマンドの実行に失敗
    Reap,     // waitの失敗
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("empty command line")]
    EmptyLine,

    /// 空のステージ。値はステージのインデックス
    #[error("syntax error near unexpected token `|' (empty command at stage {0})")]
    EmptyCommand(usize),

    #[error("syntax error: `{0}' needs a file name")]
    Redirect(String),

    #[error("invalid argument: {0:?}")]
    InvalidArgument(String),

    #[error("slice {start}..{end} out of range (length {len})")]
    Slice { start: usize, end: usize, len: usize },

    #[error("pipe: {0}")]
    Pipe(#[source] Errno),

    #[error("fork: {0}")]
    Fork(#[source] Errno),

    #[error("dup2: {0}")]
    Dup(#[source] Errno),

    #[error("close: {0}")]
    Close(#[source] Errno),

    /// パイプ表の状態遷移違反（二重クローズなど）
    #[error("pipe slot {slot} is {state:?}")]
    EndpointState { slot: usize, state: EndpointState },

    #[error("{path}: {source}")]
    Open {
        path: String,
        #[source]
        source: Errno,
    },

    #[error("{command}: {source}")]
    Exec {
        command: String,
        #[source]
        source: Errno,
    },

    #[error("wait: {0}")]
    Wait(#[source] Errno),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::EmptyLine
            | PipelineError::EmptyCommand(_)
            | PipelineError::Redirect(_)
            | PipelineError::InvalidArgument(_)
            | PipelineError::Slice { .. } => ErrorKind::Syntax,
            PipelineError::Pipe(_) | PipelineError::Fork(_) => ErrorKind::Resource,
            PipelineError::Dup(_)
            | PipelineError::Close(_)
            | PipelineError::EndpointState { .. } => ErrorKind::Wiring,
            PipelineError::Open { .. } | PipelineError::Exec { .. } => ErrorKind::Exec,
            PipelineError::Wait(_) => ErrorKind::Reap,
        }
    }
}
