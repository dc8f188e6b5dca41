//! # パイプラインを実行するシェル用クレート。
//!
//! トークン列を"|"で分割し、コマンドごとにプロセスを生成して標準入出力をパイプでつなぎ、
//! すべてのプロセスが終了するまで待機する。
//!
//! ## 利用例
//!
//! ```no_run
//! use pipesh::{Coordinator, Execvp, Host, TokenSeq};
//!
//! let tokens = TokenSeq::tokenize("ls -l | grep rs | wc -l");
//! let status = Coordinator::new(&Host, &Execvp).run(&tokens).unwrap();
//! println!("exit code: {}", status.exit_code());
//! ```
pub mod config;
pub mod coordinator;
pub mod error;
pub mod exec;
pub mod helper;
pub mod launcher;
pub mod pipes;
pub mod shell;
pub mod split;
pub mod sys;
pub mod token;

#[cfg(test)]
mod testing;

pub use coordinator::{Coordinator, PipelineStatus};
pub use error::{ErrorKind, PipelineError};
pub use exec::{Execvp, Executor};
pub use split::Pipeline;
pub use sys::{Host, Sys};
pub use token::TokenSeq;
