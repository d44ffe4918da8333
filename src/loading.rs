use std::time::Duration;

pub const INITIAL_STATUS: &str = "正在连接微博热搜榜...";
pub const STATUS_ROTATION: [&str; 5] = [
    "正在扫描今日热搜...",
    "正在筛选高热度话题...",
    "正在分析网友辣评与观点...",
    "正在核实微博来源...",
    "正在汇编您的今日早报...",
];
pub const STATUS_INTERVAL: Duration = Duration::from_millis(1500);

/// Status text to show after `elapsed` in the processing state. The first
/// interval shows the connecting message, then the rotation starts at its
/// second entry and wraps.
pub fn status_message_at(elapsed: Duration) -> &'static str {
    let ticks = elapsed.as_millis() / STATUS_INTERVAL.as_millis();
    if ticks == 0 {
        INITIAL_STATUS
    } else {
        STATUS_ROTATION[(ticks as usize) % STATUS_ROTATION.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::{INITIAL_STATUS, STATUS_INTERVAL, STATUS_ROTATION, status_message_at};
    use std::time::Duration;

    #[test]
    fn rotation_starts_after_first_interval_and_wraps() {
        assert_eq!(status_message_at(Duration::ZERO), INITIAL_STATUS);
        assert_eq!(status_message_at(Duration::from_millis(1499)), INITIAL_STATUS);
        assert_eq!(status_message_at(STATUS_INTERVAL), STATUS_ROTATION[1]);
        assert_eq!(status_message_at(STATUS_INTERVAL * 4), STATUS_ROTATION[4]);
        assert_eq!(status_message_at(STATUS_INTERVAL * 5), STATUS_ROTATION[0]);
    }
}
