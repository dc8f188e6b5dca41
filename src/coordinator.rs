//! パイプライン全体の実行。
//!
//! パイプの生成、ステージごとのfork、親側での不要な端点のクローズ、
//! すべての子プロセスの回収を行う。
use crate::{
    error::PipelineError,
    exec::Executor,
    launcher::{self, Connection},
    pipes::PipeTable,
    split::Pipeline,
    sys::Sys,
    token::TokenSeq,
};
use nix::{
    sys::{signal::Signal, wait::WaitStatus},
    unistd::{ForkResult, Pid},
};
use tracing::{debug, warn};

/// 回収した各ステージの終了コード。ステージ順
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    codes: Vec<i32>,
}

impl PipelineStatus {
    pub fn codes(&self) -> &[i32] {
        &self.codes
    }

    /// 最後のステージの終了コード
    pub fn exit_code(&self) -> i32 {
        self.codes.last().copied().unwrap_or(0)
    }

    pub fn success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// パイプラインの実行器
#[derive(Debug)]
pub struct Coordinator<'a, S, E> {
    sys: &'a S,
    exec: &'a E,
}

impl<'a, S: Sys, E: Executor> Coordinator<'a, S, E> {
    pub fn new(sys: &'a S, exec: &'a E) -> Self {
        Coordinator { sys, exec }
    }

    /// トークン列をパイプで分割して実行し、すべてのステージが終了するまで待機。
    ///
    /// すべてのステージの引数はfork前に変換し、一つでも失敗した場合は何も生成しない。
    /// 途中のステージでpipeかforkに失敗した場合、生成済みのステージをkillして
    /// 回収した後にエラーを返す。
    pub fn run(&self, tokens: &TokenSeq) -> Result<PipelineStatus, PipelineError> {
        let pipeline = Pipeline::parse(tokens)?;
        let cmds = self.prepare(&pipeline)?;
        let n = cmds.len();
        let mut table = PipeTable::new(n - 1);
        let mut children = Vec::with_capacity(n);

        for (i, cmd) in cmds.iter().enumerate() {
            if let Err(e) = self.spawn_stage(&mut table, i, n, cmd, &mut children) {
                warn!(stage = i, error = %e, "pipeline setup failed");
                self.abort(&mut table, &children);
                return Err(e);
            }
        }

        debug_assert_eq!(0, table.held_slots().count());
        self.reap(&children)
    }

    /// 各ステージを実行可能な形に変換
    fn prepare(&self, pipeline: &Pipeline) -> Result<Vec<E::Command>, PipelineError> {
        pipeline
            .stages()
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                self.exec.prepare(stage).map_err(|e| match e {
                    // リダイレクトのみのステージ
                    PipelineError::EmptyCommand(_) => PipelineError::EmptyCommand(i),
                    e => e,
                })
            })
            .collect()
    }

    /// i番目のステージを生成
    fn spawn_stage(
        &self,
        table: &mut PipeTable,
        i: usize,
        n: usize,
        cmd: &E::Command,
        children: &mut Vec<Pid>,
    ) -> Result<(), PipelineError> {
        // i番目のステージが書き込むパイプを先に生成
        if i + 1 < n {
            table.open(self.sys, i)?;
            debug!(
                pipe = i,
                read = table.fd(PipeTable::read_slot(i)),
                write = table.fd(PipeTable::write_slot(i)),
                "pipe created"
            );
        }

        let conn = Connection::for_stage(i, n);
        match unsafe { self.sys.fork() }.map_err(PipelineError::Fork)? {
            ForkResult::Child => {
                // fork後の表は子プロセスが所有する複製
                launcher::launch(self.sys, self.exec, table, cmd, conn)
            }
            ForkResult::Parent { child } => {
                debug!(stage = i, pid = %child, "stage spawned");
                children.push(child);

                // 親はパイプを読み書きしないため、子に渡した端点はすぐにクローズ。
                // パイプiの読み込み側は次のステージに渡すまで保持
                if let Some(slot) = conn.input {
                    table.close(self.sys, slot)?;
                }
                if let Some(slot) = conn.output {
                    table.close(self.sys, slot)?;
                }
                Ok(())
            }
        }
    }

    /// 生成したすべての子プロセスを回収。
    /// 途中でwaitに失敗しても残りのプロセスを回収し、最初のエラーを返す
    fn reap(&self, children: &[Pid]) -> Result<PipelineStatus, PipelineError> {
        let mut codes = Vec::with_capacity(children.len());
        let mut first_err = None;
        for pid in children {
            match self.wait_exit(*pid) {
                Ok(code) => {
                    debug!(pid = %pid, code, "stage reaped");
                    codes.push(code);
                }
                Err(e) => {
                    warn!(pid = %pid, error = %e, "failed to reap stage");
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(PipelineStatus { codes }),
        }
    }

    /// pidが終了するまで待ち、終了コードを返す。シグナルで終了した場合は128 + シグナル番号
    fn wait_exit(&self, pid: Pid) -> Result<i32, PipelineError> {
        loop {
            match self.sys.waitpid(pid).map_err(PipelineError::Wait)? {
                WaitStatus::Exited(_, status) => return Ok(status),
                WaitStatus::Signaled(_, sig, _) => return Ok(sig as i32 + 128),
                _ => (), // 停止・再開は無視して待ち続ける
            }
        }
    }

    /// セットアップ失敗時の後始末。
    /// 親が保持する端点をすべてクローズし、生成済みのステージをkillして回収
    fn abort(&self, table: &mut PipeTable, children: &[Pid]) {
        if let Err(e) = table.close_all(self.sys) {
            warn!(error = %e, "failed to close pipes");
        }

        for pid in children {
            if let Err(e) = self.sys.kill(*pid, Signal::SIGKILL) {
                warn!(pid = %pid, error = %e, "kill failed");
            }
        }
        for pid in children {
            match self.wait_exit(*pid) {
                Ok(code) => debug!(pid = %pid, code, "aborted stage reaped"),
                Err(e) => warn!(pid = %pid, error = %e, "failed to reap aborted stage"),
            }
        }
    }
}
