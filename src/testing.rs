//! 単体テスト用のSys実装。実際のシステムコールは呼ばずに呼び出しを記録する
use crate::{error::PipelineError, exec::Executor, sys::Sys, token::TokenSeq};
use nix::{
    errno::Errno,
    sys::{signal::Signal, wait::WaitStatus},
    unistd::{ForkResult, Pid},
};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    convert::Infallible,
    os::unix::io::RawFd,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pipe(RawFd, RawFd),
    Dup2(RawFd, RawFd),
    Close(RawFd),
    DupAbove(RawFd, RawFd),
    Fork(Pid),
    Wait(Pid),
    Kill(Pid, Signal),
    Exit(i32),
}

/// FakeSys::exitが巻き戻しに使う値
#[derive(Debug)]
pub struct FakeExit(pub i32);

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    open: BTreeSet<RawFd>,     // オープン中のfd
    bad_closes: Vec<RawFd>,    // オープンされていないfdのclose
    inherited: BTreeSet<RawFd>, // 子プロセスに切り替えた時点でオープン中のfd
    unreaped: HashSet<Pid>,
    exit_codes: BTreeMap<usize, i32>, // fork順からステージの終了コード
    fork_order: HashMap<Pid, usize>,
    stderr: String,
    next_fd: RawFd,
    next_pid: i32,
    pipes: usize,
    forks: usize,
    fail_pipe_at: Option<usize>,
    fail_fork_at: Option<usize>,
    fail_dup2: bool,
    fail_wait_at: Option<usize>,
    child_at: Option<usize>,
}

#[derive(Debug)]
pub struct FakeSys {
    state: RefCell<State>,
}

impl Default for FakeSys {
    fn default() -> Self {
        FakeSys {
            state: RefCell::new(State {
                next_fd: 10,
                next_pid: 1000,
                ..Default::default()
            }),
        }
    }
}

impl FakeSys {
    pub fn new() -> Self {
        Self::default()
    }

    /// n回目（0始まり）のpipeを失敗させる
    pub fn fail_pipe_at(self, n: usize) -> Self {
        self.state.borrow_mut().fail_pipe_at = Some(n);
        self
    }

    /// n回目のforkを失敗させる
    pub fn fail_fork_at(self, n: usize) -> Self {
        self.state.borrow_mut().fail_fork_at = Some(n);
        self
    }

    pub fn fail_dup2(self) -> Self {
        self.state.borrow_mut().fail_dup2 = true;
        self
    }

    /// n番目に生成したプロセスのwaitを失敗させる。そのプロセスは回収されない
    pub fn fail_wait_at(self, n: usize) -> Self {
        self.state.borrow_mut().fail_wait_at = Some(n);
        self
    }

    /// 最初に割り当てるfd。標準入出力がクローズされた状態を模擬する
    pub fn first_fd(self, fd: RawFd) -> Self {
        self.state.borrow_mut().next_fd = fd;
        self
    }

    /// n回目のforkで子プロセス側として振る舞う
    pub fn child_at(self, n: usize) -> Self {
        self.state.borrow_mut().child_at = Some(n);
        self
    }

    /// n番目に生成したプロセスの終了コード
    pub fn exit_code(self, n: usize, code: i32) -> Self {
        self.state.borrow_mut().exit_codes.insert(n, code);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn open_fds(&self) -> BTreeSet<RawFd> {
        self.state.borrow().open.clone()
    }

    pub fn bad_closes(&self) -> Vec<RawFd> {
        self.state.borrow().bad_closes.clone()
    }

    pub fn inherited(&self) -> BTreeSet<RawFd> {
        self.state.borrow().inherited.clone()
    }

    pub fn unreaped(&self) -> HashSet<Pid> {
        self.state.borrow().unreaped.clone()
    }

    pub fn stderr(&self) -> String {
        self.state.borrow().stderr.clone()
    }

    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| f(c)).count()
    }

    /// 子プロセスに切り替えた後の呼び出し
    pub fn child_calls(&self) -> Vec<Call> {
        let st = self.state.borrow();
        match st.calls.iter().position(|c| *c == Call::Fork(Pid::from_raw(0))) {
            Some(i) => st.calls[i + 1..].to_vec(),
            None => Vec::new(),
        }
    }
}

impl Sys for FakeSys {
    fn pipe(&self) -> nix::Result<(RawFd, RawFd)> {
        let mut st = self.state.borrow_mut();
        let n = st.pipes;
        st.pipes += 1;
        if st.fail_pipe_at == Some(n) {
            return Err(Errno::EMFILE);
        }

        let (r, w) = (st.next_fd, st.next_fd + 1);
        st.next_fd += 2;
        st.open.insert(r);
        st.open.insert(w);
        st.calls.push(Call::Pipe(r, w));
        Ok((r, w))
    }

    fn dup2(&self, fd: RawFd, target: RawFd) -> nix::Result<()> {
        let mut st = self.state.borrow_mut();
        st.calls.push(Call::Dup2(fd, target));
        if st.fail_dup2 || !st.open.contains(&fd) {
            return Err(Errno::EBADF);
        }
        Ok(())
    }

    fn close(&self, fd: RawFd) -> nix::Result<()> {
        let mut st = self.state.borrow_mut();
        st.calls.push(Call::Close(fd));
        if st.open.remove(&fd) {
            Ok(())
        } else {
            st.bad_closes.push(fd);
            Err(Errno::EBADF)
        }
    }

    fn dup_above(&self, fd: RawFd, min: RawFd) -> nix::Result<RawFd> {
        let mut st = self.state.borrow_mut();
        st.calls.push(Call::DupAbove(fd, min));
        if !st.open.contains(&fd) {
            return Err(Errno::EBADF);
        }
        let new = (min..).find(|n| !st.open.contains(n)).unwrap_or(min);
        st.open.insert(new);
        st.next_fd = st.next_fd.max(new + 1);
        Ok(new)
    }

    unsafe fn fork(&self) -> nix::Result<ForkResult> {
        let mut st = self.state.borrow_mut();
        let n = st.forks;
        st.forks += 1;
        if st.fail_fork_at == Some(n) {
            return Err(Errno::EAGAIN);
        }

        if st.child_at == Some(n) {
            st.calls.push(Call::Fork(Pid::from_raw(0)));
            st.inherited = st.open.clone();
            return Ok(ForkResult::Child);
        }

        let child = Pid::from_raw(st.next_pid);
        st.next_pid += 1;
        st.calls.push(Call::Fork(child));
        st.unreaped.insert(child);
        st.fork_order.insert(child, n);
        Ok(ForkResult::Parent { child })
    }

    fn waitpid(&self, pid: Pid) -> nix::Result<WaitStatus> {
        let mut st = self.state.borrow_mut();
        st.calls.push(Call::Wait(pid));
        if !st.unreaped.contains(&pid) {
            return Err(Errno::ECHILD);
        }
        let n = st.fork_order[&pid];
        if st.fail_wait_at == Some(n) {
            return Err(Errno::EINVAL);
        }
        st.unreaped.remove(&pid);
        match st.exit_codes.get(&n) {
            Some(code) if *code >= 128 => Ok(WaitStatus::Signaled(
                pid,
                Signal::try_from(code - 128).unwrap_or(Signal::SIGKILL),
                false,
            )),
            Some(code) => Ok(WaitStatus::Exited(pid, *code)),
            None => Ok(WaitStatus::Exited(pid, 0)),
        }
    }

    fn kill(&self, pid: Pid, sig: Signal) -> nix::Result<()> {
        self.state.borrow_mut().calls.push(Call::Kill(pid, sig));
        Ok(())
    }

    fn write_err(&self, msg: &str) {
        self.state.borrow_mut().stderr.push_str(msg);
    }

    fn exit(&self, code: i32) -> ! {
        self.state.borrow_mut().calls.push(Call::Exit(code));
        resume_unwind(Box::new(FakeExit(code)))
    }
}

/// fが子プロセス側でexitした場合、その終了コードを返す
pub fn run_to_exit<F: FnOnce()>(f: F) -> Option<i32> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => None,
        Err(e) => match e.downcast::<FakeExit>() {
            Ok(code) => Some(code.0),
            Err(e) => resume_unwind(e),
        },
    }
}

/// 受け取ったトークン列を記録し、常に失敗するExecutor
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    pub seen: RefCell<Vec<TokenSeq>>,
}

impl Executor for RecordingExecutor {
    type Command = TokenSeq;

    fn prepare(&self, tokens: &TokenSeq) -> Result<TokenSeq, PipelineError> {
        Ok(tokens.clone())
    }

    fn execute(&self, tokens: &TokenSeq) -> Result<Infallible, PipelineError> {
        self.seen.borrow_mut().push(tokens.clone());
        Err(PipelineError::Exec {
            command: tokens.get(0).unwrap_or_default().to_string(),
            source: Errno::ENOENT,
        })
    }
}
