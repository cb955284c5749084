//! プロセスメモリ計測
//!
//! `/proc/self/statm` からの読み出し。procfs が使えない環境では
//! 0 埋めのスナップショットを返す（計測不能で応答は落とさない）。

use serde::Serialize;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// メモリ使用量（バイト）
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// 常駐セット
    pub rss: u64,
    /// 仮想サイズ
    pub heap_total: u64,
    /// データセグメント（ヒープ+スタック）
    pub heap_used: u64,
}

/// メモリ使用量（MB、小数2桁）
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMegabytes {
    pub heap_used: f64,
    pub heap_total: f64,
    pub rss: f64,
}

impl MemorySnapshot {
    pub fn to_megabytes(&self) -> MemoryMegabytes {
        MemoryMegabytes {
            heap_used: round2(self.heap_used as f64 / BYTES_PER_MB),
            heap_total: round2(self.heap_total as f64 / BYTES_PER_MB),
            rss: round2(self.rss as f64 / BYTES_PER_MB),
        }
    }
}

/// 現在のメモリ使用量を取得する
pub fn snapshot() -> MemorySnapshot {
    read_statm().unwrap_or(MemorySnapshot {
        rss: 0,
        heap_total: 0,
        heap_used: 0,
    })
}

fn read_statm() -> Option<MemorySnapshot> {
    let page = procfs::page_size();
    let statm = procfs::process::Process::myself().ok()?.statm().ok()?;
    Some(MemorySnapshot {
        rss: statm.resident * page,
        heap_total: statm.size * page,
        heap_used: statm.data * page,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_nonzero_on_linux() {
        let snap = snapshot();
        // Linux 上で実行される前提。常駐サイズはゼロではない。
        assert!(snap.rss > 0);
        assert!(snap.heap_total >= snap.rss);
    }

    #[test]
    fn test_to_megabytes_rounds() {
        let snap = MemorySnapshot {
            rss: 3 * 1024 * 1024 + 512 * 1024, // 3.5MB
            heap_total: 8 * 1024 * 1024,
            heap_used: 1024,
        };
        let mb = snap.to_megabytes();
        assert_eq!(mb.rss, 3.5);
        assert_eq!(mb.heap_total, 8.0);
        assert_eq!(mb.heap_used, 0.0);
    }
}
