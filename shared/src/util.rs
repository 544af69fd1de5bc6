/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Whole seconds elapsed between two unix-millis timestamps, never negative.
pub fn elapsed_secs(start_millis: i64, end_millis: i64) -> i64 {
    (end_millis - start_millis).max(0) / 1000
}
