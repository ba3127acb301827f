use anyhow::{Context, Result};
use log::info;
use reqwest::Url;
use serde::Deserialize;
use std::io::{Read, Write};
use std::net::TcpListener;

use crate::config::GoogleConfig;

const REDIRECT_URI: &str = "http://localhost:8080";
const OAUTH_SCOPES: &str = "https://www.googleapis.com/auth/tasks.readonly \
    https://www.googleapis.com/auth/calendar.events.readonly \
    https://www.googleapis.com/auth/gmail.readonly";

/// 同意フローのコールバックで受け取るトークン
///
/// リフレッシュトークンは返ってきても使わない（アクセストークンの
/// 日和見キャッシュ以上の永続化はしない方針のため）。
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedToken {
    pub access_token: String,
    pub expires_in: i64,
}

/// Googleの同意フローを実行して資格情報を得る
///
/// 同意URLをブラウザで開き、ローカルのリダイレクト待ち受けで認可コードを
/// 受け取り、トークンエンドポイントで交換する。ユーザーがブラウザ側で
/// フローを放棄した場合、この関数は解決しない（タイムアウトは課さない）。
pub async fn sign_in(config: &GoogleConfig) -> Result<AuthorizedToken> {
    let auth_url = build_consent_url(&config.client_id);

    // ブラウザを開く前に待ち受けを確保しておく
    let listener = TcpListener::bind("127.0.0.1:8080")
        .context("ローカルサーバーの起動に失敗しました")?;

    println!("ブラウザでGoogle認証ページを開きます...");
    if let Err(e) = open::that(&auth_url) {
        println!("ブラウザを自動で開けませんでした: {}", e);
        println!("以下のURLをブラウザで開いて認証を行ってください:");
        println!("{}", auth_url);
    }

    println!("Google認証ページでログインして、アクセスを許可してください...");

    let code = tokio::task::spawn_blocking(move || wait_for_redirect_code(listener))
        .await
        .context("リダイレクト待機タスクが中断されました")??;

    info!("Authorization code received, exchanging for access token");

    exchange_auth_code_for_token(config, &code).await
}

/// 同意画面のURLを構築する
fn build_consent_url(client_id: &str) -> String {
    format!(
        "https://accounts.google.com/o/oauth2/auth?client_id={}&redirect_uri={}&scope={}&response_type=code&prompt=consent",
        urlencoding::encode(client_id),
        urlencoding::encode(REDIRECT_URI),
        urlencoding::encode(OAUTH_SCOPES)
    )
}

/// リダイレクトを1回受け付けて認可コードを取り出す
fn wait_for_redirect_code(listener: TcpListener) -> Result<String> {
    let (mut stream, _) = listener
        .accept()
        .context("リダイレクト待機中にエラーが発生しました")?;

    let mut buffer = [0; 1024];
    stream
        .read(&mut buffer)
        .context("リクエストの読み取りに失敗しました")?;

    let request = String::from_utf8_lossy(&buffer[..]);
    let code = extract_code_from_request(&request)?;

    // 成功ページを返す
    let response = "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<html><body><h1>認証成功</h1><p>このウィンドウを閉じて、アプリケーションに戻ってください。</p></body></html>";
    stream
        .write_all(response.as_bytes())
        .context("レスポンスの送信に失敗しました")?;

    Ok(code)
}

/// HTTPリクエストの1行目からcodeパラメータを抽出する
fn extract_code_from_request(request: &str) -> Result<String> {
    let uri = request
        .lines()
        .next()
        .ok_or_else(|| anyhow::anyhow!("リクエストの解析に失敗しました"))?
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("URLの解析に失敗しました"))?;

    let url = Url::parse(&format!("http://localhost{}", uri))
        .context("URLの解析に失敗しました")?;

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.to_string())
        .ok_or_else(|| anyhow::anyhow!("認証コードが見つかりませんでした"))
}

/// 認可コードをトークンに交換する
async fn exchange_auth_code_for_token(
    config: &GoogleConfig,
    auth_code: &str,
) -> Result<AuthorizedToken> {
    let client = reqwest::Client::new();

    let mut params = vec![
        ("client_id", config.client_id.as_str()),
        ("code", auth_code),
        ("redirect_uri", REDIRECT_URI),
        ("grant_type", "authorization_code"),
    ];
    // PKCE型クライアントではシークレットなしで交換できる
    if let Some(secret) = config.client_secret.as_deref() {
        params.push(("client_secret", secret));
    }

    let response = client
        .post("https://oauth2.googleapis.com/token")
        .form(&params)
        .send()
        .await
        .context("トークン交換リクエストの送信に失敗しました")?;

    if !response.status().is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "エラー詳細を取得できませんでした".to_string());
        return Err(anyhow::anyhow!("トークン交換に失敗しました: {}", error_text));
    }

    let token: AuthorizedToken = response
        .json()
        .await
        .context("トークンレスポンスの解析に失敗しました")?;

    Ok(token)
}
