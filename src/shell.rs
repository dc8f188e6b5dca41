use crate::{
    config::Config,
    coordinator::Coordinator,
    error::{ErrorKind, PipelineError},
    exec::Execvp,
    helper::DynError,
    sys::Host,
    token::{TokenSeq, PIPE},
};
use rustyline::{error::ReadlineError, Editor};
use signal_hook::consts::{SIGINT, SIGQUIT};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::debug;

/// 組み込みコマンドの実行結果
#[derive(Debug, PartialEq, Eq)]
enum Builtin {
    NotBuiltin,    // 組み込みコマンドではない
    Continue(i32), // 終了コード
    Quit(i32),     // シェルを終了。シェルの終了コード
}

#[derive(Debug)]
pub struct Shell {
    config: Config,
    exit_val: i32, // 直前の終了コード
}

impl Shell {
    pub fn new(config: Config) -> Self {
        Shell {
            config,
            exit_val: 0,
        }
    }

    /// 入力を読み込んで実行するループ。シェルの終了コードを返す
    pub fn run(&mut self) -> Result<i32, DynError> {
        // フォアグラウンドのパイプラインへのCtrl+Cでシェルが終了しないように設定。
        // ハンドラはexec時にデフォルトに戻る
        let interrupted = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGINT, Arc::clone(&interrupted))?;
        signal_hook::flag::register(SIGQUIT, Arc::clone(&interrupted))?;

        let mut rl = Editor::<()>::new()?;
        if let Err(e) = rl.load_history(&self.config.history_file) {
            eprintln!("pipesh: ヒストリファイルの読み込みに失敗: {e}");
        }

        let exit_val;
        loop {
            let face = if self.exit_val == 0 { '\u{1F642}' } else { '\u{1F480}' };
            match rl.readline(&format!("pipesh {face} %> ")) {
                Ok(line) => {
                    let line_trimed = line.trim();
                    if line_trimed.is_empty() {
                        continue; // 空のコマンドの場合は再読み込み
                    }
                    rl.add_history_entry(line_trimed);

                    if let Some(n) = self.eval(line_trimed) {
                        exit_val = n;
                        break;
                    }
                    if interrupted.swap(false, Ordering::Relaxed) {
                        eprintln!();
                    }
                }
                Err(ReadlineError::Interrupted) => eprintln!("pipesh: 終了はCtrl+D"),
                Err(ReadlineError::Eof) => {
                    exit_val = self.exit_val;
                    break;
                }
                Err(e) => {
                    eprintln!("pipesh: 読み込みエラー\n{e}");
                    exit_val = 1;
                    break;
                }
            }
        }

        if let Err(e) = rl.save_history(&self.config.history_file) {
            eprintln!("pipesh: ヒストリファイルの書き込みに失敗: {e}");
        }
        Ok(exit_val)
    }

    /// 1行実行。シェルを終了する場合は終了コードを返す
    fn eval(&mut self, line: &str) -> Option<i32> {
        let tokens = TokenSeq::tokenize(line);

        match builtin_cmd(&tokens, self.exit_val) {
            Builtin::Quit(n) => return Some(n),
            Builtin::Continue(n) => {
                self.exit_val = n;
                return None;
            }
            Builtin::NotBuiltin => (),
        }

        self.exit_val = match Coordinator::new(&Host, &Execvp).run(&tokens) {
            Ok(status) => {
                debug!(codes = ?status.codes(), "pipeline finished");
                status.exit_code()
            }
            Err(e) => {
                eprintln!("pipesh: {e}");
                error_exit_code(&e)
            }
        };
        None
    }
}

/// パイプラインを実行できなかった場合の終了コード。構文エラーは2
fn error_exit_code(e: &PipelineError) -> i32 {
    match e.kind() {
        ErrorKind::Syntax => 2,
        _ => 1,
    }
}

/// 組み込みコマンドを実行。パイプを含む場合は組み込みコマンドとして扱わない
fn builtin_cmd(tokens: &TokenSeq, prev: i32) -> Builtin {
    if tokens.count(PIPE) > 0 {
        return Builtin::NotBuiltin;
    }

    match tokens.get(0) {
        Some("exit") => run_exit(tokens, prev),
        Some("cd") => run_cd(tokens),
        _ => Builtin::NotBuiltin,
    }
}

/// 第1引数が指定された場合、それを終了コードとしてシェルを終了。
/// 引数がない場合は、直前の終了コードで終了
fn run_exit(tokens: &TokenSeq, prev: i32) -> Builtin {
    match tokens.get(1) {
        None => Builtin::Quit(prev),
        Some(s) => match s.parse::<i32>() {
            Ok(n) => Builtin::Quit(n),
            Err(_) => {
                eprintln!("pipesh: exit: {s}は不正な引数です");
                Builtin::Continue(1)
            }
        },
    }
}

/// カレントディレクトリを変更。引数がない場合は、ホームディレクトリに移動。第2引数以降は無視
fn run_cd(tokens: &TokenSeq) -> Builtin {
    let path = match tokens.get(1) {
        Some(p) => PathBuf::from(p),
        None => dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
    };

    match std::env::set_current_dir(&path) {
        Ok(()) => Builtin::Continue(0),
        Err(e) => {
            eprintln!("pipesh: cd: {}: {e}", path.display());
            Builtin::Continue(1)
        }
    }
}
