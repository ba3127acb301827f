use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::process::Command;

/// ユーザーホームディレクトリのパスを取得
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

/// XDGデータディレクトリを取得
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(dir)
    } else {
        get_home_dir()?.join(".local").join("share")
    };

    let app_data_dir = data_dir.join("agenta_rs");

    if !app_data_dir.exists() {
        fs::create_dir_all(&app_data_dir)
            .context("Failed to create data directory")?;
    }

    Ok(app_data_dir)
}

/// ネット接続状態をチェック
pub fn check_internet_connection() -> bool {
    // Googleのパブリックなサーバーに接続してネット状態をチェック
    let output = Command::new("ping")
        .args(["-c", "1", "-W", "1", "8.8.8.8"])
        .output();

    match output {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
