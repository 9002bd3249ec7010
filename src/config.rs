use serde::Deserialize;

use crate::error::Result;
use crate::storage::DiskType;

#[derive(Debug, PartialEq, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub disk_type: DiskType,
    /// path of the backing storage file, ignored for the memory disk.
    pub path: String,
    /// number of frames the buffer pool owns.
    pub pool_size: usize,
    /// history threshold of the LRU-K replacer.
    pub replacer_k: usize,
}

impl Config {
    #[allow(dead_code)]
    fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "Debug")?
            .set_default("disk_type", "Memory")?
            .set_default("path", "bufpool.db")?
            .set_default("pool_size", 64)?
            .set_default("replacer_k", 2)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("BUFPOOL"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() -> Result<()> {
        let cfg = Config::new("")?;
        assert_eq!(LogLevel::Debug, cfg.log_level);
        assert_eq!(DiskType::Memory, cfg.disk_type);
        assert_eq!(64, cfg.pool_size);
        assert_eq!(2, cfg.replacer_k);
        Ok(())
    }
}
