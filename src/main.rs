use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::Parser;
use console::style;
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time;

mod auth;
mod classify;
mod config;
mod google;
mod normalize;
mod pipeline;
mod session;
mod summarize;
mod utils;
mod webhook;
mod wizard;

use config::AppConfig;
use google::GoogleClient;
use pipeline::DisplayLine;
use session::{FileCredentialStore, Session};
use summarize::GeminiSummarizer;
use webhook::WebhookClient;
use wizard::ConfigWizard;

/// Terminal scheduling assistant with Google Workspace and webhook integration
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Path to config file
    #[clap(short, long, value_parser, default_value = "config.toml")]
    config: PathBuf,

    /// Run configuration wizard
    #[clap(long)]
    wizard: bool,

    /// Connect a Google account (runs the OAuth consent flow)
    #[clap(long)]
    connect: bool,

    /// Disconnect the Google account and clear the cached credential
    #[clap(long)]
    disconnect: bool,

    /// Submit a scheduling prompt to the configured webhook
    #[clap(short, long)]
    prompt: Option<String>,

    /// Dashboard date (YYYY-MM-DD, defaults to today)
    #[clap(short, long, value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Keep refreshing the dashboard on an interval
    #[clap(short, long)]
    watch: bool,
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("日付はYYYY-MM-DD形式で指定してください: {}", e))
}

/// アプリケーションのロギングを初期化
fn init_logging() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    info!("agenta_rs v{} を起動しました", env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let args = Args::parse();

    // 設定ウィザードを実行
    if args.wizard {
        info!("Starting configuration wizard");
        let wizard = ConfigWizard::new();
        return wizard.run().await;
    }

    // 設定ファイルを読み込む（無ければデフォルト＋環境変数）
    let config = config::load_config(&args.config)
        .context("Failed to load configuration")?;

    info!("Starting agenta_rs v{}", env!("CARGO_PKG_VERSION"));

    // 保存済みの資格情報からセッションを復元
    let store = FileCredentialStore::open_default()
        .context("Failed to open credential store")?;
    let mut session = Session::restore(store, Utc::now());

    if args.disconnect {
        session.sign_out();
        println!("アカウント連携を解除しました");
        return Ok(());
    }

    if args.connect {
        let Some(google_config) = config.google.as_ref() else {
            // クライアントID未設定ならサインイン機能そのものを無効にする
            println!("GoogleクライアントIDが設定されていないため、サインインは利用できません。");
            println!(
                "`--wizard` で設定するか、環境変数 AGENTA_GOOGLE_CLIENT_ID を設定してください。"
            );
            return Ok(());
        };

        session.begin_sign_in();
        let token = auth::sign_in(google_config).await?;
        session.complete_sign_in(token.access_token, token.expires_in, Utc::now());
        println!("{}", style("Googleアカウントに接続しました").green());
    }

    // ユーザー起点のWebhook送信モード
    if let Some(prompt) = args.prompt.as_deref() {
        return submit_prompt(&config, prompt).await;
    }

    let date = args.date.unwrap_or_else(|| Local::now().date_naive());

    if args.watch {
        info!("Running in watch mode");
        run_watch(&config, &session, date).await
    } else {
        run_refresh(&config, &session, date).await
    }
}

/// プロンプトをWebhookに送信して応答またはエラーを表示する
async fn submit_prompt(config: &AppConfig, prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        println!("プロンプトが空です");
        return Ok(());
    }

    let client = WebhookClient::new(&config.webhook);

    match client.submit(prompt).await {
        Ok(body) => {
            println!("{}", style("Webhook応答:").bold());
            println!("{}", body);
        }
        Err(e) => {
            // エラー時は応答パネル相当の出力を行わず、エラー文字列だけを出す
            println!("{}", style(format!("エラー: {}", e)).red());
        }
    }

    Ok(())
}

/// ダッシュボードを1回リフレッシュする
async fn run_refresh(
    config: &AppConfig,
    session: &Session<FileCredentialStore>,
    date: NaiveDate,
) -> Result<()> {
    let Some(token) = session.access_token(Utc::now()) else {
        println!("Googleアカウント未接続です。`--connect` で接続すると");
        println!("タスク・カレンダー・ミーティングを表示できます。");
        return Ok(());
    };

    let client = GoogleClient::new(token);
    let summarizer = GeminiSummarizer::from_config(config.gemini.clone());
    let now = Local::now();

    // タスクは単純な取得、カレンダーとメールはパイプラインを並行に実行する
    let tasks = match client.fetch_open_tasks(now).await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("Failed to fetch tasks: {}", e);
            Vec::new()
        }
    };

    let (calendar_lines, meeting_lines) = tokio::join!(
        fetch_calendar_lines(&client, &summarizer, date, now),
        fetch_meeting_lines(&client, &summarizer, now),
    );

    render_dashboard(date, &tasks, &calendar_lines, &meeting_lines);

    Ok(())
}

/// 定期的にリフレッシュし続ける
///
/// リフレッシュは順序化される：前回の取得が完了してから次のtickを処理し、
/// 途中で取り消すことはしない。各リストはリフレッシュごとに丸ごと
/// 置き換えられる。
async fn run_watch(
    config: &AppConfig,
    session: &Session<FileCredentialStore>,
    date: NaiveDate,
) -> Result<()> {
    let refresh_interval = Duration::from_secs(config.general.refresh_interval_secs);
    info!(
        "Refreshing every {} seconds",
        config.general.refresh_interval_secs
    );

    let mut timer = time::interval(refresh_interval);

    loop {
        timer.tick().await;

        if !utils::check_internet_connection() {
            info!("No internet connection detected, skipping refresh");
            continue;
        }

        if let Err(e) = run_refresh(config, session, date).await {
            error!("Refresh failed: {}", e);
        }
    }
}

async fn fetch_calendar_lines(
    client: &GoogleClient,
    summarizer: &GeminiSummarizer,
    date: NaiveDate,
    now: DateTime<Local>,
) -> Vec<DisplayLine> {
    match client.fetch_events_for_date(date).await {
        Ok(events) => pipeline::calendar_display_lines(&events, summarizer, now).await,
        Err(e) => {
            error!("Failed to fetch calendar events: {}", e);
            Vec::new()
        }
    }
}

async fn fetch_meeting_lines(
    client: &GoogleClient,
    summarizer: &GeminiSummarizer,
    now: DateTime<Local>,
) -> Vec<DisplayLine> {
    match client.fetch_meeting_messages().await {
        Ok(messages) => pipeline::mail_display_lines(&messages, summarizer, now).await,
        Err(e) => {
            error!("Failed to fetch meeting messages: {}", e);
            Vec::new()
        }
    }
}

/// 3つのウィジェットをターミナルに描画する
fn render_dashboard(
    date: NaiveDate,
    tasks: &[google::Task],
    calendar_lines: &[DisplayLine],
    meeting_lines: &[DisplayLine],
) {
    println!();
    println!("{}", style(format!("=== Agenta: {} ===", date)).bold());

    println!("\n{}", style("今日のタスク").bold());
    if tasks.is_empty() {
        println!("  タスクはありません");
    }
    for task in tasks {
        match task.due.as_deref().and_then(normalize::parse_structured) {
            Some(due) => println!("  ・{} ({})", task.title, normalize::format_display(&due)),
            None => println!("  ・{}", task.title),
        }
    }

    println!("\n{}", style("選択日のイベント").bold());
    if calendar_lines.is_empty() {
        println!("  イベントはありません");
    }
    for line in calendar_lines {
        println!("  {}", line.text);
    }

    println!("\n{}", style("今後のミーティング").bold());
    if meeting_lines.is_empty() {
        println!("  ミーティングの予定はありません");
    }
    for line in meeting_lines {
        println!("  {}", line.text);
    }
    println!();
}
