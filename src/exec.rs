//! パイプを含まない単一コマンドの実行
use crate::{error::PipelineError, token::TokenSeq};
use nix::{
    fcntl::{open, OFlag},
    libc,
    sys::{
        signal::{signal, SigHandler, Signal},
        stat::Mode,
    },
    unistd::{self, dup2, execvp},
};
use std::{
    convert::Infallible,
    ffi::{CStr, CString},
    os::unix::io::RawFd,
};

/// 単一コマンドの実行器。
///
/// prepareはfork前に親プロセスで呼び出され、構文の検査と引数の変換を行う。
/// executeはfork後の子プロセスで呼び出され、成功時はプロセスイメージが
/// 置き換わるため戻らず、失敗時のみエラーを返す。
/// 呼び出し側はエラーを受け取ったらプロセスを終了すること
pub trait Executor {
    type Command;

    fn prepare(&self, tokens: &TokenSeq) -> Result<Self::Command, PipelineError>;

    fn execute(&self, cmd: &Self::Command) -> Result<Infallible, PipelineError>;
}

/// リダイレクトを除いたコマンドライン
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub stdin: Option<String>,  // < で指定したファイル
    pub stdout: Option<String>, // > で指定したファイル
}

impl Invocation {
    /// トークン列から`<`と`>`によるリダイレクトを取り出す。
    /// 同じ向きのリダイレクトが複数ある場合は最後のものが有効
    pub fn parse(tokens: &TokenSeq) -> Result<Self, PipelineError> {
        let mut inv = Invocation::default();
        let mut it = tokens.iter();
        while let Some(tok) = it.next() {
            match tok.as_str() {
                op @ ("<" | ">") => {
                    let path = match it.next() {
                        Some(p) if !is_operator(p) => p.clone(),
                        _ => return Err(PipelineError::Redirect(op.to_string())),
                    };
                    if op == "<" {
                        inv.stdin = Some(path);
                    } else {
                        inv.stdout = Some(path);
                    }
                }
                _ => inv.argv.push(tok.clone()),
            }
        }

        if inv.argv.is_empty() {
            return Err(PipelineError::EmptyCommand(0));
        }
        Ok(inv)
    }
}

fn is_operator(tok: &str) -> bool {
    matches!(tok, "<" | ">" | "|")
}

/// execvpに渡せる形に変換済みのコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    argv: Vec<CString>,
    stdin: Option<CString>,
    stdout: Option<CString>,
}

impl Prepared {
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }
}

fn to_cstring(s: &str) -> Result<CString, PipelineError> {
    CString::new(s).map_err(|_| PipelineError::InvalidArgument(s.to_string()))
}

/// リダイレクトを行い、execvpでコマンドを実行
#[derive(Debug, Default, Clone, Copy)]
pub struct Execvp;

impl Executor for Execvp {
    type Command = Prepared;

    fn prepare(&self, tokens: &TokenSeq) -> Result<Prepared, PipelineError> {
        let inv = Invocation::parse(tokens)?;
        Ok(Prepared {
            argv: inv
                .argv
                .iter()
                .map(|s| to_cstring(s))
                .collect::<Result<_, _>>()?,
            stdin: inv.stdin.as_deref().map(to_cstring).transpose()?,
            stdout: inv.stdout.as_deref().map(to_cstring).transpose()?,
        })
    }

    fn execute(&self, cmd: &Prepared) -> Result<Infallible, PipelineError> {
        if let Some(path) = &cmd.stdin {
            redirect_file(path, OFlag::O_RDONLY, libc::STDIN_FILENO)?;
        }
        if let Some(path) = &cmd.stdout {
            redirect_file(
                path,
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                libc::STDOUT_FILENO,
            )?;
        }

        let exec_err = |e| PipelineError::Exec {
            command: cmd.argv[0].to_string_lossy().into_owned(),
            source: e,
        };

        // Rustのランタイムが無視に設定したSIGPIPEはexec後も引き継がれるため戻す
        unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) }.map_err(exec_err)?;

        // 実行ファイルをメモリに読み込み
        execvp(&cmd.argv[0], &cmd.argv).map_err(exec_err)
    }
}

/// pathをオープンしてtargetに複製
fn redirect_file(path: &CStr, flag: OFlag, target: RawFd) -> Result<(), PipelineError> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    let fd = open(path, flag | OFlag::O_CLOEXEC, mode).map_err(|e| PipelineError::Open {
        path: path.to_string_lossy().into_owned(),
        source: e,
    })?;

    if fd != target {
        let r = dup2(fd, target).map_err(PipelineError::Dup);
        unistd::close(fd).map_err(PipelineError::Close)?;
        r?;
    }
    Ok(())
}
