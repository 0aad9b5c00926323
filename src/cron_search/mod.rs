//! CronSearch reconciler: periodic creation of Searches off a cron schedule.

pub mod reconciler;
