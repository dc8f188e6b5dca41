//! パイプ表。N個のコマンドをつなぐN-1個のパイプの端点を管理する
//!
//! パイプkの読み込み側はスロット2k、書き込み側はスロット2k+1に格納される。
//! 各端点は`Unopened -> Open -> (Duplicated ->) Closed`の順にのみ遷移し、
//! 二重クローズやクローズ後の利用はエラーとなる。
use crate::{error::PipelineError, sys::Sys};
use std::os::unix::io::RawFd;

/// 端点の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Unopened,   // パイプ未生成
    Open,       // オープン中
    Duplicated, // 標準入出力に複製済み。元のfdはまだオープン中
    Closed,     // クローズ済み
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    fd: RawFd,
    state: EndpointState,
}

#[derive(Debug, Clone)]
pub struct PipeTable {
    slots: Vec<Endpoint>,
}

impl PipeTable {
    /// n_pipes個のパイプ用の表を作成。パイプ自体はopenで生成
    pub fn new(n_pipes: usize) -> Self {
        PipeTable {
            slots: vec![
                Endpoint {
                    fd: -1,
                    state: EndpointState::Unopened,
                };
                2 * n_pipes
            ],
        }
    }

    /// パイプkの読み込み側のスロット
    pub fn read_slot(k: usize) -> usize {
        2 * k
    }

    /// パイプkの書き込み側のスロット
    pub fn write_slot(k: usize) -> usize {
        2 * k + 1
    }

    pub fn state(&self, slot: usize) -> Option<EndpointState> {
        self.slots.get(slot).map(|e| e.state)
    }

    /// オープン中のfd。Unopened、Closedの場合はNone
    pub fn fd(&self, slot: usize) -> Option<RawFd> {
        let e = self.slots.get(slot)?;
        match e.state {
            EndpointState::Open | EndpointState::Duplicated => Some(e.fd),
            _ => None,
        }
    }

    /// まだクローズされていないスロット
    pub fn held_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.slots.len()).filter(|i| self.fd(*i).is_some())
    }

    /// パイプkを生成
    pub fn open<S: Sys>(&mut self, sys: &S, k: usize) -> Result<(), PipelineError> {
        let (r, w) = (Self::read_slot(k), Self::write_slot(k));
        for slot in [r, w] {
            self.expect(slot, &[EndpointState::Unopened])?;
        }

        let (rfd, wfd) = sys.pipe().map_err(PipelineError::Pipe)?;
        self.slots[r] = Endpoint {
            fd: rfd,
            state: EndpointState::Open,
        };
        self.slots[w] = Endpoint {
            fd: wfd,
            state: EndpointState::Open,
        };
        Ok(())
    }

    /// slotのfdをtargetに複製
    pub fn dup_onto<S: Sys>(
        &mut self,
        sys: &S,
        slot: usize,
        target: RawFd,
    ) -> Result<(), PipelineError> {
        self.expect(slot, &[EndpointState::Open])?;
        let e = &mut self.slots[slot];
        sys.dup2(e.fd, target).map_err(PipelineError::Dup)?;
        e.state = EndpointState::Duplicated;
        Ok(())
    }

    /// slotのfdをクローズ。
    /// closeが失敗した場合もfdの状態は不定なので、Closedとして扱う
    pub fn close<S: Sys>(&mut self, sys: &S, slot: usize) -> Result<(), PipelineError> {
        self.expect(slot, &[EndpointState::Open, EndpointState::Duplicated])?;
        let e = &mut self.slots[slot];
        e.state = EndpointState::Closed;
        sys.close(e.fd).map_err(PipelineError::Close)
    }

    /// fdを複製した後、元のfdをクローズ
    pub fn redirect<S: Sys>(
        &mut self,
        sys: &S,
        slot: usize,
        target: RawFd,
    ) -> Result<(), PipelineError> {
        self.dup_onto(sys, slot, target)?;
        self.close(sys, slot)
    }

    /// limit未満の番号を持つ端点をlimit以上の番号に移す。
    /// 標準入出力がクローズされた状態で生成したパイプが0番や1番を使っていると、
    /// 標準入出力への複製で上書きされるため、複製の前に呼び出す
    pub fn relocate_below<S: Sys>(&mut self, sys: &S, limit: RawFd) -> Result<(), PipelineError> {
        for slot in 0..self.slots.len() {
            if let Some(state @ EndpointState::Duplicated) = self.state(slot) {
                return Err(PipelineError::EndpointState { slot, state });
            }
            let old = match self.fd(slot) {
                Some(fd) if fd < limit => fd,
                _ => continue,
            };
            let new = sys.dup_above(old, limit).map_err(PipelineError::Dup)?;
            self.slots[slot].fd = new;
            sys.close(old).map_err(PipelineError::Close)?;
        }
        Ok(())
    }

    /// クローズされていないすべてのスロットをクローズ。
    /// 途中で失敗してもすべてクローズを試み、最初のエラーを返す
    pub fn close_all<S: Sys>(&mut self, sys: &S) -> Result<(), PipelineError> {
        let mut result = Ok(());
        for slot in 0..self.slots.len() {
            if self.fd(slot).is_none() {
                continue;
            }
            if let Err(e) = self.close(sys, slot) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn expect(&self, slot: usize, states: &[EndpointState]) -> Result<(), PipelineError> {
        let state = self.state(slot).ok_or(PipelineError::EndpointState {
            slot,
            state: EndpointState::Unopened,
        })?;
        if states.contains(&state) {
            Ok(())
        } else {
            Err(PipelineError::EndpointState { slot, state })
        }
    }
}
