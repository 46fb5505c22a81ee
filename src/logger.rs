use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// 追加写入的文件日志
pub struct Logger {
    file: Mutex<File>,
    level: LevelFilter,
}

impl Logger {
    pub fn new(log_path: &Path, level: LevelFilter) -> Result<Self, std::io::Error> {
        if let Some(dir) = log_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Logger {
            file: Mutex::new(file),
            level,
        })
    }

    pub fn init(log_path: &Path, level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
        let logger = Self::new(log_path, level)?;
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level);
        Ok(())
    }

    fn format(record: &Record) -> String {
        format!(
            "[{}] [{}] [{}:{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let entry = Self::format(record);
            if let Ok(mut file) = self.file.lock() {
                let _ = file.write_all(entry.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// 配置了日志文件时写文件，否则交给 env_logger 输出到 stderr
pub fn init(log_file: Option<&Path>, level: LevelFilter) {
    if let Some(path) = log_file {
        match Logger::init(path, level) {
            Ok(()) => return,
            Err(e) => eprintln!("初始化文件日志失败，改用标准错误输出: {}", e),
        }
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.to_string().to_lowercase()),
    )
    .format_timestamp_millis()
    .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use rand::{thread_rng, Rng};

    #[test]
    fn writes_records_at_or_above_level() {
        let path = std::env::temp_dir()
            .join(format!("support-portal-log-{}", thread_rng().gen::<u64>()))
            .join("app.log");
        let logger = Logger::new(&path, LevelFilter::Info).unwrap();

        logger.log(
            &Record::builder()
                .level(Level::Info)
                .file(Some("src/user/service.rs"))
                .line(Some(42))
                .args(format_args!("用户 alice 登录成功"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("hidden"))
                .build(),
        );
        logger.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[INFO] [src/user/service.rs:42] 用户 alice 登录成功"));
        assert!(!content.contains("hidden"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
