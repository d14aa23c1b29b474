use std::fmt;

/// Configuration for sensitive data sanitization
#[derive(Clone, Debug)]
pub struct SanitizationConfig {
    /// Whether to sanitize lightning invoices
    pub sanitize_invoices: bool,
    /// Maximum characters to show from start/end of sensitive data
    pub partial_show_chars: usize,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            sanitize_invoices: true,
            partial_show_chars: 6,
        }
    }
}

/// A wrapper for sensitive data that implements safe Display
#[derive(Clone, Debug)]
pub struct SensitiveData<T> {
    inner: T,
    data_type: SensitiveDataType,
    config: SanitizationConfig,
}

#[derive(Clone, Debug, Copy)]
pub enum SensitiveDataType {
    /// Lightning invoice (bolt11)
    LightningInvoice,
    /// Opaque order token (promo or API token)
    OrderToken,
    /// Lightning node public key
    NodePubkey,
}

impl SensitiveDataType {
    fn display_name(&self) -> &'static str {
        match self {
            Self::LightningInvoice => "invoice",
            Self::OrderToken => "token",
            Self::NodePubkey => "pubkey",
        }
    }
}

impl<T: fmt::Display> SensitiveData<T> {
    pub fn new(data: T, data_type: SensitiveDataType) -> Self {
        Self {
            inner: data,
            data_type,
            config: SanitizationConfig::default(),
        }
    }

    pub fn with_config(data: T, data_type: SensitiveDataType, config: SanitizationConfig) -> Self {
        Self {
            inner: data,
            data_type,
            config,
        }
    }

    fn sanitized_repr(&self) -> String {
        let original = self.inner.to_string();

        let should_sanitize = match self.data_type {
            SensitiveDataType::LightningInvoice => self.config.sanitize_invoices,
            SensitiveDataType::OrderToken | SensitiveDataType::NodePubkey => true,
        };

        if !should_sanitize || original.is_empty() {
            return original;
        }

        let len = original.len();
        let show = self.config.partial_show_chars;
        if len <= show * 2 || !original.is_ascii() {
            format!(
                "[REDACTED_{}]",
                self.data_type.display_name().to_uppercase()
            )
        } else {
            let start = &original[..show];
            let end = &original[len - show..];
            format!(
                "{}[REDACTED_{}_{}_CHARS]{}",
                start,
                self.data_type.display_name().to_uppercase(),
                len - show * 2,
                end
            )
        }
    }
}

impl<T: fmt::Display> fmt::Display for SensitiveData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sanitized_repr())
    }
}

pub fn sanitize_invoice<T: fmt::Display>(invoice: T) -> SensitiveData<T> {
    SensitiveData::new(invoice, SensitiveDataType::LightningInvoice)
}

pub fn sanitize_token<T: fmt::Display>(token: T) -> SensitiveData<T> {
    SensitiveData::new(token, SensitiveDataType::OrderToken)
}

pub fn sanitize_node_pubkey<T: fmt::Display>(pubkey: T) -> SensitiveData<T> {
    SensitiveData::new(pubkey, SensitiveDataType::NodePubkey)
}
