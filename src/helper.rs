use std::error::Error;

pub type DynError = Box<dyn Error + Send + Sync + 'static>;

/// システムコール呼び出しのラッパ。EINTRならリトライ
pub fn syscall<F, T>(f: F) -> Result<T, nix::Error>
where
    F: Fn() -> Result<T, nix::Error>,
{
    loop {
        match f() {
            Err(nix::Error::EINTR) => (), // リトライ
            result => return result,
        }
    }
}
