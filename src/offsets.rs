//! Offset 存储 - 连接器名称 → offset JSON
//!
//! 运行开始时读取一次，结束时整体写回。整个运行期间持有 `<path>.lock` 上的独占锁，
//! 写入先落到 `<path>.tmp` 再原子替换。

use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 默认 offset 文件路径
pub const DEFAULT_OFFSETS_PATH: &str = "offsets.json";

/// 连接器名称 → offset；值对运行器不透明
pub type OffsetMap = BTreeMap<String, Value>;

/// 加锁的 offset 文件
#[derive(Debug)]
pub struct OffsetStore {
    path: PathBuf,
    lock: File,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl OffsetStore {
    /// 打开并加锁；已有其他运行持有锁时立即失败
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("could not create directory {}", parent.display()))?;
        }

        let lock_path = sibling(&path, ".lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("could not open lock file {}", lock_path.display()))?;

        lock.try_lock_exclusive().with_context(|| {
            format!(
                "another run is in progress (lock held on {})",
                lock_path.display()
            )
        })?;

        debug!(path = %path.display(), "Acquired offset store lock");
        Ok(Self { path, lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取所有 offset；文件不存在或为空时返回空表
    pub fn read(&self) -> Result<OffsetMap> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(OffsetMap::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("could not read offsets from {}", self.path.display()))
            }
        };

        if content.trim().is_empty() {
            return Ok(OffsetMap::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("could not parse offsets in {}", self.path.display()))
    }

    /// 整体写回（临时文件 + 原子替换）
    pub fn write(&self, offsets: &OffsetMap) -> Result<()> {
        let temp_path = sibling(&self.path, ".tmp");
        {
            let mut temp_file = File::create(&temp_path)
                .with_context(|| format!("could not create {}", temp_path.display()))?;
            serde_json::to_writer_pretty(&mut temp_file, offsets)?;
            temp_file.write_all(b"\n")?;
            temp_file.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("could not replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = offsets.len(), "Saved offsets");
        Ok(())
    }
}

impl Drop for OffsetStore {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock);
    }
}
