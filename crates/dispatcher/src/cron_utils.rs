use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use hub_core::{HubError, HubResult};

/// CRON表达式解析和调度工具
///
/// 支持秒级 6/7 段表达式；Quartz 风格的 `?` 按 `*` 处理，
/// 5 段表达式自动补 `0` 秒。
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> HubResult<Self> {
        let expression = normalize_cron_expression(cron_expr);
        let schedule = Schedule::from_str(&expression).map_err(|e| HubError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { expression, schedule })
    }

    /// 规范化后的表达式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次执行时间（严格晚于 `from`）
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 计算窗口 `[start, end)` 内不早于 `now` 的下一次触发时间
    pub fn next_fire_in_window(
        &self,
        now: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        // after() 不含起点，起点本身也可能是触发时间
        let from = if now < start {
            start - Duration::milliseconds(1)
        } else {
            now
        };
        let next = self.schedule.after(&from).next()?;
        if next < end {
            Some(next)
        } else {
            debug!("表达式 {} 在窗口结束 {} 前没有触发时间", self.expression, end);
            None
        }
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.schedule.after(&now).next().map(|next| next - now)
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> HubResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 获取任务的执行频率描述
    pub fn get_frequency_description(&self) -> String {
        let upcoming = self.upcoming_times(Utc::now(), 2);
        if upcoming.len() >= 2 {
            let seconds = (upcoming[1] - upcoming[0]).num_seconds();
            match seconds {
                s if s < 60 => format!("每{s}秒"),
                s if s < 3600 => format!("每{}分钟", s / 60),
                s if s < 86400 => format!("每{}小时", s / 3600),
                s if s < 604800 => format!("每{}天", s / 86400),
                s => format!("每{}周", s / 604800),
            }
        } else {
            "无法确定频率".to_string()
        }
    }
}

/// `?` 替换为 `*`，5 段表达式补秒字段
pub fn normalize_cron_expression(cron_expr: &str) -> String {
    let fields: Vec<String> = cron_expr
        .split_whitespace()
        .map(|field| if field == "?" { "*".to_string() } else { field.to_string() })
        .collect();

    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_normalize_quartz_and_five_fields() {
        assert_eq!(normalize_cron_expression("0 0 8 * * ?"), "0 0 8 * * *");
        assert_eq!(normalize_cron_expression("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron_expression("  0  30 9 * * * "), "0 30 9 * * *");
    }

    #[test]
    fn test_invalid_expression() {
        let err = CronScheduler::new("not a cron").err().unwrap();
        assert!(matches!(err, HubError::InvalidCron { .. }));
        assert!(CronScheduler::validate_cron_expression("0 0 8 * * ?").is_ok());
    }

    #[test]
    fn test_next_fire_respects_window() {
        let scheduler = CronScheduler::new("0 * * * * *").unwrap();

        // 窗口尚未开始：从窗口起点（含）开始计算
        let next = scheduler.next_fire_in_window(at(9, 0, 30), at(10, 0, 0), at(11, 0, 0));
        assert_eq!(next, Some(at(10, 0, 0)));

        // 窗口内
        let next = scheduler.next_fire_in_window(at(10, 5, 30), at(10, 0, 0), at(11, 0, 0));
        assert_eq!(next, Some(at(10, 6, 0)));

        // 结束时间不含
        let next = scheduler.next_fire_in_window(at(10, 59, 30), at(10, 0, 0), at(11, 0, 0));
        assert_eq!(next, None);
    }

    #[test]
    fn test_frequency_description() {
        let scheduler = CronScheduler::new("0 */5 * * * *").unwrap();
        assert_eq!(scheduler.get_frequency_description(), "每5分钟");
        assert_eq!(scheduler.expression(), "0 */5 * * * *");
    }
}
