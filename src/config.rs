//! 環境変数から読み込む設定
use std::{env, path::PathBuf};

const HISTORY_FILE: &str = ".pipesh_history";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub history_file: PathBuf, // ヒストリファイル
    pub log_filter: String,    // tracingのフィルタ
}

impl Config {
    /// 環境変数から設定を読み込む
    ///
    /// - PIPESH_HISTORY: ヒストリファイル。未指定なら~/.pipesh_history
    /// - PIPESH_LOG、RUST_LOG: ログのフィルタ。未指定ならwarn
    pub fn from_env() -> Self {
        Self::from_vars(|k| env::var(k).ok(), dirs::home_dir())
    }

    fn from_vars<F>(var: F, home: Option<PathBuf>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let history_file = match var("PIPESH_HISTORY").filter(|s| !s.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => match home {
                Some(mut h) => {
                    h.push(HISTORY_FILE);
                    h
                }
                None => PathBuf::from(HISTORY_FILE),
            },
        };

        let log_filter = var("PIPESH_LOG")
            .or_else(|| var("RUST_LOG"))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Config {
            history_file,
            log_filter,
        }
    }
}
