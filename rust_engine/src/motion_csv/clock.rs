//! 时钟
//!
//! CSV 文件名里的时间戳通过注入的时钟取得，测试中替换为固定时刻。

use chrono::{Local, NaiveDateTime};

/// 当前时刻的来源
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// 本地时间
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 始终返回同一时刻
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
