//! Msisdn normalization stage.

use async_trait::async_trait;

use crate::message::Message;

use super::{Middleware, MiddlewareError};

/// Normalize an msisdn to international `+<country><subscriber>` format.
///
/// Accepts local numbers with a leading `0`, bare international numbers,
/// and `00`-prefixed international dialing. Already-normalized numbers are
/// returned unchanged.
pub fn normalize_msisdn(addr: &str, country_code: &str) -> String {
    let addr: String = addr
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if let Some(rest) = addr.strip_prefix("00") {
        return format!("+{rest}");
    }
    if let Some(rest) = addr.strip_prefix('0') {
        return format!("+{country_code}{rest}");
    }
    if addr.starts_with('+') {
        return addr;
    }
    if addr.starts_with(country_code) {
        return format!("+{addr}");
    }
    format!("+{country_code}{addr}")
}

/// Rewrites `from_addr` on inbound messages to international format, and
/// optionally strips the leading `+` from `to_addr` on outbound messages
/// for transports that want bare digits.
pub struct NormalizeMsisdnMiddleware {
    country_code: String,
    strip_plus: bool,
}

impl NormalizeMsisdnMiddleware {
    pub fn new(country_code: &str, strip_plus: bool) -> Self {
        Self {
            country_code: country_code.to_string(),
            strip_plus,
        }
    }
}

#[async_trait]
impl Middleware for NormalizeMsisdnMiddleware {
    fn name(&self) -> &'static str {
        "normalize_msisdn"
    }

    async fn handle_inbound(&self, mut message: Message) -> Result<Message, MiddlewareError> {
        message.from_addr = normalize_msisdn(&message.from_addr, &self.country_code);
        Ok(message)
    }

    async fn handle_outbound(&self, mut message: Message) -> Result<Message, MiddlewareError> {
        if self.strip_plus && message.to_addr.starts_with('+') {
            message.to_addr = message.to_addr.trim_start_matches('+').to_string();
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Direction;

    #[test]
    fn test_normalize_local_number() {
        assert_eq!(normalize_msisdn("0700123456", "256"), "+256700123456");
    }

    #[test]
    fn test_normalize_already_international() {
        assert_eq!(normalize_msisdn("+256700123456", "256"), "+256700123456");
    }

    #[test]
    fn test_normalize_double_zero_prefix() {
        assert_eq!(normalize_msisdn("00256700123456", "256"), "+256700123456");
    }

    #[test]
    fn test_normalize_bare_international() {
        assert_eq!(normalize_msisdn("256700123456", "256"), "+256700123456");
    }

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_msisdn("0700 123-456", "256"), "+256700123456");
    }

    #[tokio::test]
    async fn test_inbound_rewrites_from_addr() {
        let mw = NormalizeMsisdnMiddleware::new("256", false);
        let msg = Message::new("0700123456", "8500", None, Direction::Inbound);
        let out = mw.handle_inbound(msg).await.unwrap();
        assert_eq!(out.from_addr, "+256700123456");
    }

    #[tokio::test]
    async fn test_outbound_strip_plus() {
        let mw = NormalizeMsisdnMiddleware::new("256", true);
        let msg = Message::new("8500", "+256700123456", None, Direction::Outbound);
        let out = mw.handle_outbound(msg).await.unwrap();
        assert_eq!(out.to_addr, "256700123456");
    }

    #[tokio::test]
    async fn test_outbound_no_strip_by_default() {
        let mw = NormalizeMsisdnMiddleware::new("256", false);
        let msg = Message::new("8500", "+256700123456", None, Direction::Outbound);
        let out = mw.handle_outbound(msg).await.unwrap();
        assert_eq!(out.to_addr, "+256700123456");
    }
}
