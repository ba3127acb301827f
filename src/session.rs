use chrono::{DateTime, Duration, TimeZone, Utc};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::utils;

// 元のWebクライアントがlocalStorageに使っていたキー名をそのまま使う
const ACCESS_TOKEN_KEY: &str = "google_token";
const EXPIRY_KEY: &str = "google_token_expires";

/// 資格情報の永続化先
///
/// 注入されるキーバリュー能力。保存は日和見的なもので、失敗しても
/// セッション自体は壊さない（実装側が警告ログを出すに留める）。
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// アクセス資格情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// アクセストークン
    pub access_token: String,

    /// 失効時刻
    pub expires_at: DateTime<Utc>,
}

/// セッションの状態
///
/// Unauthenticated → Authenticating → Authenticated と遷移し、
/// 失効または明示的なサインアウトでUnauthenticatedに戻る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated(Credential),
}

/// プロセス全体で1つ持つセッションホルダー
pub struct Session<S: CredentialStore> {
    state: SessionState,
    store: S,
}

impl<S: CredentialStore> Session<S> {
    /// 保存済みの資格情報から復元する
    ///
    /// 保存された失効時刻が未来の場合のみ復元し、そうでなければ
    /// Unauthenticatedで開始する（保存値は無視される）。
    pub fn restore(store: S, now: DateTime<Utc>) -> Self {
        let stored = store.read(ACCESS_TOKEN_KEY).zip(
            store
                .read(EXPIRY_KEY)
                .and_then(|raw| raw.parse::<i64>().ok())
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        );

        let state = match stored {
            Some((access_token, expires_at)) if expires_at > now => {
                info!("Restored stored credential, valid until {}", expires_at);
                SessionState::Authenticated(Credential {
                    access_token,
                    expires_at,
                })
            }
            Some(_) => {
                info!("Stored credential is expired, starting unauthenticated");
                SessionState::Unauthenticated
            }
            None => SessionState::Unauthenticated,
        };

        Self { state, store }
    }

    /// 現在の状態
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// サインインを開始する（外部の同意フローが起動されたことを示す）
    ///
    /// ユーザーがフローを放棄した場合はAuthenticatingのまま留まる。
    /// このコンポーネントはタイムアウトを課さない。
    pub fn begin_sign_in(&mut self) {
        self.state = SessionState::Authenticating;
    }

    /// 同意フローのコールバックで得た資格情報を受け取る
    pub fn complete_sign_in(&mut self, access_token: String, expires_in_secs: i64, now: DateTime<Utc>) {
        let expires_at = now + Duration::seconds(expires_in_secs);

        self.store.write(ACCESS_TOKEN_KEY, &access_token);
        self.store
            .write(EXPIRY_KEY, &expires_at.timestamp_millis().to_string());

        info!("Signed in, credential valid until {}", expires_at);
        self.state = SessionState::Authenticated(Credential {
            access_token,
            expires_at,
        });
    }

    /// サインアウトしてメモリと永続化の両方を無条件にクリアする
    pub fn sign_out(&mut self) {
        self.store.remove(ACCESS_TOKEN_KEY);
        self.store.remove(EXPIRY_KEY);
        self.state = SessionState::Unauthenticated;
        info!("Signed out");
    }

    /// 有効なアクセストークンを返す（失効していればNone）
    pub fn access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated(credential) if credential.expires_at > now => {
                Some(&credential.access_token)
            }
            _ => None,
        }
    }
}

/// JSONファイルに保存するストア実装
///
/// XDGデータディレクトリ配下の1ファイルにキーバリューのマップとして持つ。
/// 読み書きの失敗は警告ログに留める。
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// 既定の保存先（XDGデータディレクトリ）で開く
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self::new(utils::get_data_dir()?.join("session.json")))
    }

    fn load_map(&self) -> BTreeMap<String, String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed session file {:?}: {}", self.path, e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        }
    }

    fn save_map(&self, map: &BTreeMap<String, String>) {
        match serde_json::to_string_pretty(map) {
            Ok(raw) => {
                if let Err(e) = fs::write(&self.path, raw) {
                    warn!("Failed to persist session file {:?}: {}", self.path, e);
                }
            }
            Err(e) => warn!("Failed to serialize session data: {}", e),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn read(&self, key: &str) -> Option<String> {
        self.load_map().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) {
        let mut map = self.load_map();
        map.insert(key.to_string(), value.to_string());
        self.save_map(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = self.load_map();
        if map.remove(key).is_some() {
            self.save_map(&map);
        }
    }
}
