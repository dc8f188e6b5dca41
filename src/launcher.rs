//! fork後の子プロセス側の処理。標準入出力をパイプにつなぎ、コマンドを実行
use crate::{error::PipelineError, exec::Executor, pipes::PipeTable, sys::Sys};
use nix::libc;
use std::fmt::{self, Write};

/// ステージの接続先。Noneの場合は親から継承した標準入出力を使う
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub input: Option<usize>,  // 読み込むパイプのスロット
    pub output: Option<usize>, // 書き込むパイプのスロット
}

impl Connection {
    /// n個中i番目のステージの接続先。
    /// i > 0ならパイプi-1から読み込み、i < n-1ならパイプiへ書き込む
    pub fn for_stage(i: usize, n: usize) -> Self {
        Connection {
            input: (i > 0).then(|| PipeTable::read_slot(i - 1)),
            output: (i + 1 < n).then(|| PipeTable::write_slot(i)),
        }
    }
}

/// 標準入出力をパイプに複製し、それ以外のパイプの端点はすべてクローズ
pub fn wire<S: Sys>(sys: &S, table: &mut PipeTable, conn: Connection) -> Result<(), PipelineError> {
    // 標準入出力がクローズされた状態で生成したパイプは0番から2番を使っている場合がある
    table.relocate_below(sys, libc::STDERR_FILENO + 1)?;

    if let Some(slot) = conn.input {
        table.redirect(sys, slot, libc::STDIN_FILENO)?;
    }
    if let Some(slot) = conn.output {
        table.redirect(sys, slot, libc::STDOUT_FILENO)?;
    }

    // 書き込み側が一つでも残っていると、読み込み側はEOFを受け取れない
    table.close_all(sys)
}

/// 子プロセスとしてステージを実行。成功時はexecされ、失敗時はプロセスを終了するため戻らない
pub fn launch<S: Sys, E: Executor>(
    sys: &S,
    exec: &E,
    table: &mut PipeTable,
    cmd: &E::Command,
    conn: Connection,
) -> ! {
    let err = match wire(sys, table, conn) {
        Err(e) => e,
        Ok(()) => match exec.execute(cmd) {
            Err(e) => e,
            Ok(never) => match never {},
        },
    };

    let mut msg = MsgBuf::new();
    let _ = write!(msg, "pipesh: {err}");
    sys.write_err(msg.finish());
    sys.exit(1)
}

/// エラーメッセージ用の固定長バッファ。入りきらない部分は切り捨てる
struct MsgBuf {
    buf: [u8; 512],
    len: usize,
}

impl MsgBuf {
    fn new() -> Self {
        MsgBuf {
            buf: [0; 512],
            len: 0,
        }
    }

    /// 改行を付けて文字列を返す
    fn finish(&mut self) -> &str {
        self.buf[self.len] = b'\n';
        self.len += 1;
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("pipesh: error\n")
    }
}

impl Write for MsgBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // 改行用に1バイト残す
        let room = self.buf.len() - 1 - self.len;
        let mut n = s.len().min(room);
        while !s.is_char_boundary(n) {
            n -= 1;
        }
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}
