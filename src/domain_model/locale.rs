use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ar,
    En,
}

impl Locale {
    /// Value of the upstream `langCode` header.
    pub fn lang_code(self) -> &'static str {
        match self {
            Locale::Ar => "1",
            Locale::En => "2",
        }
    }

    /// Anything other than `"2"` is Arabic.
    pub fn from_lang_code(code: &str) -> Self {
        if code.trim() == "2" {
            Locale::En
        } else {
            Locale::Ar
        }
    }

    pub fn message(self, key: MessageKey) -> &'static str {
        match self {
            Locale::Ar => match key {
                MessageKey::Timeout => "انتهت مهلة الطلب. يرجى المحاولة مرة أخرى",
                MessageKey::Network => "فشل الاتصال بالسيرفر. تحقق من اتصال الإنترنت",
                MessageKey::Unauthorized => "غير مصرح",
                MessageKey::SessionExpired => "انتهت صلاحية الجلسة. يرجى تسجيل الدخول مرة أخرى.",
                MessageKey::RateLimit => "محاولات كثيرة جداً. يرجى الانتظار",
                MessageKey::ServerError => "خطأ في السيرفر. يرجى المحاولة لاحقاً",
                MessageKey::Validation => "بيانات غير صحيحة",
            },
            Locale::En => match key {
                MessageKey::Timeout => "Request timeout. Please try again",
                MessageKey::Network => "Network connection failed. Check your internet",
                MessageKey::Unauthorized => "Unauthorized",
                MessageKey::SessionExpired => "Session expired. Please log in again.",
                MessageKey::RateLimit => "Too many attempts. Please wait",
                MessageKey::ServerError => "Server error. Please try later",
                MessageKey::Validation => "Invalid data",
            },
        }
    }

    pub fn retry_after_message(self, retry_after_secs: u64) -> String {
        let base = self.message(MessageKey::RateLimit);
        match self {
            Locale::Ar => format!("{base}. حاول مرة أخرى بعد {retry_after_secs} ثانية"),
            Locale::En => format!("{base}. Try again after {retry_after_secs} seconds"),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::Ar => write!(f, "ar"),
            Locale::En => write!(f, "en"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    Timeout,
    Network,
    Unauthorized,
    SessionExpired,
    RateLimit,
    ServerError,
    Validation,
}
