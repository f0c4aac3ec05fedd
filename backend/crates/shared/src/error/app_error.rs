//! Application Error - Unified error type for the application
//!
//! Defines [`AppError`] struct and [`AppResult<T>`] type alias.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use super::kind::ErrorKind;

/// アプリケーション統一エラー型
///
/// プロジェクト全体で使用する標準エラー型です。
/// レスポンスボディの契約
/// `{ error, message, details?, retryAfter?, callToAction? }`
/// に直接対応します。ビルダーパターンを使用してエラーを構築できます。
///
/// ## Fields
/// * `kind` - エラーの分類（HTTP ステータスコードにマッピング）
/// * `code` - 機械可読エラーコード（ボディの `error` フィールド）
/// * `message` - ユーザー向けのエラーメッセージ
/// * `details` - 追加情報（オプション、任意の JSON）
/// * `retry_after` - 再試行可能になるまでの秒数（オプション）
/// * `call_to_action` - 登録・アップグレード誘導ブロック（オプション）
/// * `source` - 元のエラー（オプション、デバッグ用）
///
/// ## Examples
/// ```rust
/// use kernel::error::{app_error::AppError, kind::ErrorKind};
///
/// // シンプルなエラー
/// let err = AppError::new(ErrorKind::NotFound, "Session not found");
///
/// // 詳細なエラー
/// let err = AppError::new(ErrorKind::TooManyRequests, "Too many requests")
///     .with_code("rate_limit_exceeded")
///     .with_retry_after(42);
/// ```
pub struct AppError {
    /// エラー種別
    kind: ErrorKind,
    /// 機械可読エラーコード
    code: Cow<'static, str>,
    /// ユーザー向けメッセージ
    message: Cow<'static, str>,
    /// 追加情報
    details: Option<serde_json::Value>,
    /// 再試行までの秒数
    retry_after: Option<u64>,
    /// 誘導ブロック
    call_to_action: Option<serde_json::Value>,
    /// 元のエラー（デバッグ用）
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

/// アプリケーション結果型エイリアス
///
/// `Result<T, AppError>` の省略形です。
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// 新しいエラーを作成
    ///
    /// エラーコードは `kind` の既定値で初期化されます。
    ///
    /// ## Arguments
    /// * `kind` - エラー種別
    /// * `message` - ユーザー向けメッセージ
    #[inline]
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            code: Cow::Borrowed(kind.default_code()),
            message: message.into(),
            details: None,
            retry_after: None,
            call_to_action: None,
            source: None,
        }
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    /// 400 Bad Request エラー
    #[inline]
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// 401 Unauthorized エラー
    #[inline]
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// 403 Forbidden エラー
    #[inline]
    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// 404 Not Found エラー
    #[inline]
    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// 409 Conflict エラー
    #[inline]
    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// 429 Too Many Requests エラー
    #[inline]
    pub fn too_many_requests(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::TooManyRequests, message)
    }

    /// 500 Internal Server Error
    #[inline]
    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InternalServerError, message)
    }

    /// 503 Service Unavailable エラー
    #[inline]
    pub fn service_unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// 機械可読エラーコードを上書き
    ///
    /// ## Examples
    /// ```rust
    /// use kernel::error::app_error::AppError;
    /// let err = AppError::forbidden("No free runs left")
    ///     .with_code("anonymous_quota_exceeded");
    /// assert_eq!(err.code(), "anonymous_quota_exceeded");
    /// ```
    #[inline]
    pub fn with_code(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = code.into();
        self
    }

    /// 追加情報（任意の JSON）を設定
    #[inline]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 再試行までの秒数を設定
    #[inline]
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    /// 誘導ブロック（登録・アップグレード案内）を設定
    #[inline]
    pub fn with_call_to_action(mut self, cta: serde_json::Value) -> Self {
        self.call_to_action = Some(cta);
        self
    }

    /// 元のエラーを設定（デバッグ用）
    #[inline]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// エラー種別を取得
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// HTTP ステータスコードを取得
    #[inline]
    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// 機械可読エラーコードを取得
    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// メッセージを取得
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 追加情報を取得
    #[inline]
    pub fn details(&self) -> Option<&serde_json::Value> {
        self.details.as_ref()
    }

    /// 再試行までの秒数を取得
    #[inline]
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// 誘導ブロックを取得
    #[inline]
    pub fn call_to_action(&self) -> Option<&serde_json::Value> {
        self.call_to_action.as_ref()
    }

    /// サーバーエラーかどうか
    #[inline]
    pub fn is_server_error(&self) -> bool {
        self.kind.is_server_error()
    }

    /// クライアントエラーかどうか
    #[inline]
    pub fn is_client_error(&self) -> bool {
        self.kind.is_client_error()
    }

    /// レスポンスボディを JSON で構築
    ///
    /// `{ error, message, details?, retryAfter?, callToAction? }`
    /// の契約形状を返します。`None` のフィールドは省略されます。
    pub fn to_body(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("error".to_string(), serde_json::json!(self.code.as_ref()));
        map.insert(
            "message".to_string(),
            serde_json::json!(self.message.as_ref()),
        );
        if let Some(details) = &self.details {
            map.insert("details".to_string(), details.clone());
        }
        if let Some(retry_after) = self.retry_after {
            map.insert("retryAfter".to_string(), serde_json::json!(retry_after));
        }
        if let Some(cta) = &self.call_to_action {
            map.insert("callToAction".to_string(), cta.clone());
        }
        serde_json::Value::Object(map)
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("AppError");
        builder.field("kind", &self.kind);
        builder.field("code", &self.code);
        builder.field("message", &self.message);
        if let Some(details) = &self.details {
            builder.field("details", details);
        }
        if let Some(retry_after) = &self.retry_after {
            builder.field("retry_after", retry_after);
        }
        if let Some(source) = &self.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}
