//! Per-sample view over a fragment's `trun`, `tfhd`, `sdtp` and `mdat`.

use crate::boxes::{Sdtp, SdtpEntry, Tfhd, Trun};
use crate::{Error, Result};
use bytes::Bytes;

/// One sample with every field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSample {
    pub duration: u32,
    /// Must equal `data.len()` when handed to `Fragment::set_samples`.
    pub size: u32,
    pub flags: u32,
    pub composition_offset: Option<i32>,
    pub dependency: Option<SdtpEntry>,
    pub data: Bytes,
}

impl FragmentSample {
    /// A sample whose size is taken from `data`.
    pub fn new(duration: u32, flags: u32, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            duration,
            size: data.len() as u32,
            flags,
            composition_offset: None,
            dependency: None,
            data,
        }
    }

    pub fn with_composition_offset(mut self, offset: i32) -> Self {
        self.composition_offset = Some(offset);
        self
    }

    pub fn with_dependency(mut self, dependency: SdtpEntry) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Whether the sample is a sync sample (`sample_is_non_sync_sample` clear).
    pub fn is_sync(&self) -> bool {
        self.flags & 0x0001_0000 == 0
    }
}

/// Iterator over the samples of a fragment.
///
/// Duration and size come from the `trun` entry, else from the `tfhd`
/// default; a sample with neither is an error. Flags fall back further to
/// zero. Sample data is sliced from `mdat` by running offset from its first
/// byte.
pub struct Samples<'a> {
    tfhd: &'a Tfhd,
    trun: &'a Trun,
    sdtp: Option<&'a Sdtp>,
    data: &'a Bytes,
    index: usize,
    offset: usize,
}

impl<'a> Samples<'a> {
    pub(crate) fn new(tfhd: &'a Tfhd, trun: &'a Trun, sdtp: Option<&'a Sdtp>, data: &'a Bytes) -> Self {
        // sdtp only applies when it describes every sample.
        let sdtp = sdtp.filter(|s| s.entries.len() == trun.sample_count());
        Self {
            tfhd,
            trun,
            sdtp,
            data,
            index: 0,
            offset: 0,
        }
    }

    fn resolve(&mut self) -> Result<FragmentSample> {
        let index = self.index;
        let entry = &self.trun.entries()[index];

        let duration = entry
            .duration
            .or(self.tfhd.default_sample_duration)
            .ok_or_else(|| Error::validation(format!("sample {} has no duration", index)))?;
        let size = entry
            .size
            .or(self.tfhd.default_sample_size)
            .ok_or_else(|| Error::validation(format!("sample {} has no size", index)))?;

        let first_sample_flags = if index == 0 {
            self.trun.first_sample_flags
        } else {
            None
        };
        let flags = first_sample_flags
            .or(entry.flags)
            .or(self.tfhd.default_sample_flags)
            .unwrap_or(0);

        let end = self.offset + size as usize;
        if end > self.data.len() {
            return Err(Error::validation(format!(
                "sample {} spans bytes {}..{} but mdat holds {}",
                index,
                self.offset,
                end,
                self.data.len()
            )));
        }
        let data = self.data.slice(self.offset..end);
        self.offset = end;

        Ok(FragmentSample {
            duration,
            size,
            flags,
            composition_offset: entry.composition_offset,
            dependency: self.sdtp.map(|s| s.entries[index]),
            data,
        })
    }
}

impl Iterator for Samples<'_> {
    type Item = Result<FragmentSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.trun.sample_count() {
            return None;
        }
        let sample = self.resolve();
        self.index += 1;
        if sample.is_err() {
            // Later offsets are meaningless once one sample fails.
            self.index = self.trun.sample_count();
        }
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.trun.sample_count() - self.index;
        (0, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::TrunEntry;

    #[test]
    fn test_resolves_defaults_and_first_sample_flags() {
        let tfhd = Tfhd {
            default_sample_duration: Some(1024),
            default_sample_flags: Some(0x0101_0000),
            ..Tfhd::new(1)
        };
        let entries = [3u32, 2]
            .iter()
            .map(|s| TrunEntry {
                size: Some(*s),
                ..Default::default()
            })
            .collect();
        let mut trun = Trun::new(entries).unwrap();
        trun.first_sample_flags = Some(0x0200_0000);
        let data = Bytes::from_static(&[1, 1, 1, 2, 2]);

        let samples: Vec<_> = Samples::new(&tfhd, &trun, None, &data)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].duration, 1024);
        assert_eq!(samples[0].flags, 0x0200_0000);
        assert!(samples[0].is_sync());
        assert_eq!(samples[1].flags, 0x0101_0000);
        assert_eq!(samples[1].data.as_ref(), &[2, 2]);
    }

    #[test]
    fn test_sdtp_ignored_when_counts_differ() {
        let tfhd = Tfhd {
            default_sample_duration: Some(1),
            default_sample_size: Some(1),
            ..Tfhd::new(1)
        };
        let trun = Trun::new(vec![TrunEntry::default(); 2]).unwrap();
        let sdtp = Sdtp::new(vec![SdtpEntry::from_byte(0x20)]);
        let data = Bytes::from_static(&[0, 0]);

        let first = Samples::new(&tfhd, &trun, Some(&sdtp), &data)
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(first.dependency, None);
    }

    #[test]
    fn test_missing_size_is_an_error() {
        let tfhd = Tfhd {
            default_sample_duration: Some(1),
            ..Tfhd::new(1)
        };
        let trun = Trun::new(vec![TrunEntry::default()]).unwrap();
        let data = Bytes::new();
        let mut samples = Samples::new(&tfhd, &trun, None, &data);
        assert!(samples.next().unwrap().is_err());
        assert!(samples.next().is_none());
    }
}
