//! Aggregate download progress across all active torrents

use crate::rpc::{Torrent, TorrentProgress, TorrentStatus};

/// Combined view of every torrent that is currently downloading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub count: usize,
    pub total_bytes: u64,
    pub left_bytes: u64,
}

impl DownloadSummary {
    /// Fraction of the combined size already downloaded, in `[0, 1]`
    ///
    /// Torrents are weighted by size, so a large download dominates small ones.
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let done = self.total_bytes.saturating_sub(self.left_bytes);
        (done as f64 / self.total_bytes as f64).clamp(0.0, 1.0)
    }

    pub fn is_active(&self) -> bool {
        self.count > 0
    }
}

/// Ids of torrents in the downloading state
pub fn downloading_ids(torrents: &[Torrent]) -> Vec<i64> {
    torrents
        .iter()
        .filter(|t| t.status == TorrentStatus::Downloading)
        .map(|t| t.id)
        .collect()
}

pub fn summarize<'a>(torrents: impl IntoIterator<Item = &'a TorrentProgress>) -> DownloadSummary {
    torrents
        .into_iter()
        .fold(DownloadSummary::default(), |mut acc, t| {
            acc.count += 1;
            acc.total_bytes = acc.total_bytes.saturating_add(t.size_when_done);
            acc.left_bytes = acc.left_bytes.saturating_add(t.left_until_done);
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent(id: i64, status: i64) -> Torrent {
        Torrent {
            id,
            name: format!("torrent-{id}"),
            status: TorrentStatus::from(status),
        }
    }

    fn progress(id: i64, size: u64, left: u64) -> TorrentProgress {
        TorrentProgress {
            id,
            name: format!("torrent-{id}"),
            size_when_done: size,
            left_until_done: left,
        }
    }

    #[test]
    fn test_only_downloading_torrents_are_kept() {
        let torrents = vec![
            torrent(1, 0), // stopped
            torrent(2, 4), // downloading
            torrent(3, 3), // queued for download
            torrent(4, 6), // seeding
            torrent(5, 4),
        ];
        assert_eq!(downloading_ids(&torrents), vec![2, 5]);
    }

    #[test]
    fn test_progress_is_weighted_by_size() {
        // 900 of 1000 bytes and 0 of 100 bytes: 900 / 1100 overall
        let items = vec![progress(1, 1000, 100), progress(2, 100, 100)];
        let summary = summarize(&items);

        assert_eq!(summary.count, 2);
        assert_eq!(summary.total_bytes, 1100);
        assert_eq!(summary.left_bytes, 200);
        assert!((summary.progress() - 900.0 / 1100.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize(std::iter::empty());
        assert_eq!(summary, DownloadSummary::default());
        assert!(!summary.is_active());
        assert_eq!(summary.progress(), 0.0);
    }

    #[test]
    fn test_zero_sized_torrents_do_not_divide_by_zero() {
        // Magnet links report zero size until metadata arrives
        let items = vec![progress(1, 0, 0)];
        let summary = summarize(&items);
        assert!(summary.is_active());
        assert_eq!(summary.progress(), 0.0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let summary = DownloadSummary {
            count: 1,
            total_bytes: 100,
            left_bytes: 500,
        };
        assert_eq!(summary.progress(), 0.0);

        let done = DownloadSummary {
            count: 1,
            total_bytes: 100,
            left_bytes: 0,
        };
        assert_eq!(done.progress(), 1.0);
    }
}
