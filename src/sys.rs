//! パイプラインが利用するシステムコール
use crate::helper::syscall;
use nix::{
    fcntl::{fcntl, FcntlArg},
    libc,
    sys::{
        signal::{kill, Signal},
        wait::{waitpid, WaitStatus},
    },
    unistd::{self, dup2, fork, pipe, ForkResult, Pid},
};
use std::os::unix::io::RawFd;

/// ファイルディスクリプタとプロセスの操作。
/// テストでは呼び出しを記録する実装に差し替える
pub trait Sys {
    /// パイプを生成し、(読み込み側, 書き込み側)を返す
    fn pipe(&self) -> nix::Result<(RawFd, RawFd)>;

    /// fdをtargetに複製
    fn dup2(&self, fd: RawFd, target: RawFd) -> nix::Result<()>;

    fn close(&self, fd: RawFd) -> nix::Result<()>;

    /// fdをmin以上で最小の空き番号に複製し、その番号を返す
    fn dup_above(&self, fd: RawFd, min: RawFd) -> nix::Result<RawFd>;

    /// # Safety
    ///
    /// 子プロセス側ではexecかexitするまでロックを取得する処理を行わないこと。
    /// 引数の変換などのメモリ確保はfork前に済ませておく
    unsafe fn fork(&self) -> nix::Result<ForkResult>;

    /// pidが終了するまで待機
    fn waitpid(&self, pid: Pid) -> nix::Result<WaitStatus>;

    fn kill(&self, pid: Pid, sig: Signal) -> nix::Result<()>;

    /// 標準エラー出力に書き込む。fork後の子プロセスからも呼び出せる
    fn write_err(&self, msg: &str);

    /// 即座にプロセスを終了
    fn exit(&self, code: i32) -> !;
}

/// nixを利用した実装
#[derive(Debug, Default, Clone, Copy)]
pub struct Host;

impl Sys for Host {
    fn pipe(&self) -> nix::Result<(RawFd, RawFd)> {
        syscall(pipe)
    }

    fn dup2(&self, fd: RawFd, target: RawFd) -> nix::Result<()> {
        syscall(|| dup2(fd, target)).map(|_| ())
    }

    fn close(&self, fd: RawFd) -> nix::Result<()> {
        // EINTRでもfdは解放済みなのでリトライしない
        unistd::close(fd)
    }

    fn dup_above(&self, fd: RawFd, min: RawFd) -> nix::Result<RawFd> {
        syscall(|| fcntl(fd, FcntlArg::F_DUPFD(min)))
    }

    unsafe fn fork(&self) -> nix::Result<ForkResult> {
        syscall(|| unsafe { fork() })
    }

    fn waitpid(&self, pid: Pid) -> nix::Result<WaitStatus> {
        syscall(|| waitpid(pid, None))
    }

    fn kill(&self, pid: Pid, sig: Signal) -> nix::Result<()> {
        kill(pid, sig)
    }

    fn write_err(&self, msg: &str) {
        let mut buf = msg.as_bytes();
        while !buf.is_empty() {
            match syscall(|| unistd::write(libc::STDERR_FILENO, buf)) {
                Ok(0) | Err(_) => break,
                Ok(n) => buf = &buf[n..],
            }
        }
    }

    fn exit(&self, code: i32) -> ! {
        // 親から複製したヒープやバッファは解放・フラッシュしない
        unsafe { libc::_exit(code) }
    }
}
