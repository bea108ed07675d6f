//! Domain logic for client-side operations.
//!
//! This module contains pure functions that implement business logic
//! without side effects, making them easy to test.

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `failed_attempts` - Consecutive failed attempts since the last successful connection
/// * `max_attempts` - The maximum number of attempts allowed (`None` for unlimited)
///
/// # Returns
///
/// `true` if reconnection should be attempted, `false` otherwise
pub fn should_attempt_reconnect(failed_attempts: u32, max_attempts: Option<u32>) -> bool {
    match max_attempts {
        Some(max) => failed_attempts < max,
        None => true,
    }
}

/// Reason reported when the server or the network ends a connection without an error
pub fn close_reason(code_and_reason: Option<(u16, &str)>) -> String {
    match code_and_reason {
        Some((_, reason)) if !reason.is_empty() => reason.to_string(),
        Some((code, _)) => format!("closed by server (code {})", code),
        None => "transport close".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_attempt_reconnect_unlimited() {
        // テスト項目: 上限が無い場合、何度失敗しても再接続を試みる
        // given (前提条件):
        let failed_attempts = 1_000;

        // when (操作):
        let result = should_attempt_reconnect(failed_attempts, None);

        // then (期待する結果):
        assert!(result);
    }

    #[test]
    fn test_should_attempt_reconnect_within_limit() {
        // テスト項目: 失敗回数が上限未満なら再接続を試みる
        // when (操作):
        let result = should_attempt_reconnect(2, Some(3));

        // then (期待する結果):
        assert!(result);
    }

    #[test]
    fn test_should_attempt_reconnect_at_limit() {
        // テスト項目: 失敗回数が上限に達したら再接続しない
        // when (操作):
        let result = should_attempt_reconnect(3, Some(3));

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_close_reason() {
        // テスト項目: クローズフレームの内容から切断理由の文字列を作る
        // then (期待する結果):
        assert_eq!(close_reason(Some((1001, "going away"))), "going away");
        assert_eq!(close_reason(Some((1000, ""))), "closed by server (code 1000)");
        assert_eq!(close_reason(None), "transport close");
    }
}
