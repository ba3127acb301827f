use anyhow::{Context, Result};
use chrono::Utc;
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use std::fs;

use crate::auth;
use crate::config::{AppConfig, GeminiConfig, GeneralConfig, GoogleConfig, WebhookConfig};
use crate::session::{FileCredentialStore, Session};

/// 対話型設定ウィザード
pub struct ConfigWizard {
    term: Term,
    theme: ColorfulTheme,
}

impl ConfigWizard {
    /// 新しいウィザードインスタンスを作成
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
            theme: ColorfulTheme::default(),
        }
    }

    /// ウィザードを実行
    pub async fn run(&self) -> Result<()> {
        self.term.clear_screen()?;

        println!("{}", style("agenta_rs 設定ウィザード").bold().underlined());
        println!("このウィザードでは、アプリケーションの設定を対話的に行います。\n");

        // 基本設定
        let general_config = self.configure_general()?;

        // Webhook設定
        let webhook_config = self.configure_webhook()?;

        // Google設定（オプション）
        let google_config = self.configure_google().await?;

        // Gemini設定（オプション）
        let gemini_config = self.configure_gemini()?;

        // 設定をマージ
        let config = AppConfig {
            general: general_config,
            webhook: webhook_config,
            google: google_config,
            gemini: gemini_config,
        };

        // 設定ファイルを保存
        self.save_config(&config)?;

        println!("\n{}", style("設定が完了しました！").green().bold());
        println!(
            "ダッシュボードを表示するには: {} を実行してください",
            style("cargo run").cyan()
        );

        Ok(())
    }

    /// 基本設定
    fn configure_general(&self) -> Result<GeneralConfig> {
        println!("\n{}", style("基本設定").bold());

        let refresh_interval_secs: u64 = Input::with_theme(&self.theme)
            .with_prompt("watchモードでの再取得間隔（秒）")
            .default(300)
            .interact_text()?;

        Ok(GeneralConfig {
            refresh_interval_secs,
        })
    }

    /// Webhook設定
    fn configure_webhook(&self) -> Result<WebhookConfig> {
        println!("\n{}", style("Webhook設定").bold());
        println!("スケジューリングプロンプトの送信先（n8nなどのワークフロー自動化のWebhook URL）です。");

        let default = WebhookConfig::default();

        let url: String = Input::with_theme(&self.theme)
            .with_prompt("Webhook URL")
            .default(default.url)
            .interact_text()?;

        let secret: String = Input::with_theme(&self.theme)
            .with_prompt("共有シークレット（使わない場合は空のまま）")
            .allow_empty(true)
            .interact_text()?;

        Ok(WebhookConfig {
            url,
            secret: if secret.trim().is_empty() {
                None
            } else {
                Some(secret)
            },
        })
    }

    /// Google設定（オプション）
    async fn configure_google(&self) -> Result<Option<GoogleConfig>> {
        println!("\n{}", style("Googleアカウント設定（オプション）").bold());

        let use_google = Confirm::with_theme(&self.theme)
            .with_prompt("Googleアカウント（タスク・カレンダー・Gmail）と連携しますか？")
            .default(false)
            .interact_on(&self.term)?;

        if !use_google {
            return Ok(None);
        }

        println!("Google Cloud Consoleでの準備が必要です：");
        println!("1. https://console.cloud.google.com/apis/dashboard で新しいプロジェクトを作成");
        println!("2. Tasks API / Calendar API / Gmail API を有効化");
        println!("3. OAuth同意画面を設定（テスト用は外部を選択）");
        println!("4. OAuth 2.0クライアントIDを作成（リダイレクトURIに http://localhost:8080 を追加）");
        println!();

        let client_id: String = Input::with_theme(&self.theme)
            .with_prompt("Google Cloud OAuth クライアントID")
            .interact_on(&self.term)?;

        let client_secret: String = Input::with_theme(&self.theme)
            .with_prompt("クライアントシークレット（PKCEクライアントの場合は空のまま）")
            .allow_empty(true)
            .interact_on(&self.term)?;

        let config = GoogleConfig {
            client_id,
            client_secret: if client_secret.trim().is_empty() {
                None
            } else {
                Some(client_secret)
            },
        };

        // その場で同意フローを実行して動作確認できる
        let connect_now = Confirm::with_theme(&self.theme)
            .with_prompt("今すぐ接続して動作確認しますか？")
            .default(true)
            .interact_on(&self.term)?;

        if connect_now {
            println!("\n{}", style("OAuth認証を開始します...").green());
            match auth::sign_in(&config).await {
                Ok(token) => {
                    let store = FileCredentialStore::open_default()?;
                    let mut session = Session::restore(store, Utc::now());
                    session.begin_sign_in();
                    session.complete_sign_in(token.access_token, token.expires_in, Utc::now());
                    println!("{}", style("認証が完了しました！").green());
                }
                Err(e) => {
                    println!("認証に失敗しました: {}", e);
                    println!("後から `--connect` で再試行できます。");
                }
            }
        }

        Ok(Some(config))
    }

    /// Gemini設定（オプション）
    fn configure_gemini(&self) -> Result<Option<GeminiConfig>> {
        println!("\n{}", style("Gemini要約設定（オプション）").bold());
        println!("設定しない場合、表示行はローカルの決定的な整形になります。");

        let use_gemini = Confirm::with_theme(&self.theme)
            .with_prompt("Geminiで表示行を要約しますか？")
            .default(false)
            .interact_on(&self.term)?;

        if !use_gemini {
            return Ok(None);
        }

        let api_key: String = Input::with_theme(&self.theme)
            .with_prompt("Gemini APIキー")
            .interact_on(&self.term)?;

        let mut config = GeminiConfig::with_api_key(api_key);
        let endpoint: String = Input::with_theme(&self.theme)
            .with_prompt("生成エンドポイントURL")
            .default(config.endpoint.clone())
            .interact_text()?;
        config.endpoint = endpoint;

        Ok(Some(config))
    }

    /// 設定ファイルを保存
    fn save_config(&self, config: &AppConfig) -> Result<()> {
        println!("\n設定内容を確認します：");

        // 設定内容のプレビュー
        let config_str = toml::to_string_pretty(config)?;
        println!("{}", style("```").dim());
        println!("{}", config_str);
        println!("{}", style("```").dim());

        let confirm = Confirm::with_theme(&self.theme)
            .with_prompt("この設定をconfig.tomlに保存しますか？")
            .default(true)
            .interact_on(&self.term)?;

        if confirm {
            fs::write("config.toml", config_str)
                .context("設定ファイルの保存に失敗しました")?;
            println!(
                "設定ファイルを {} に保存しました",
                style("config.toml").yellow()
            );
            Ok(())
        } else {
            println!("設定の保存をキャンセルしました");
            Ok(())
        }
    }
}
