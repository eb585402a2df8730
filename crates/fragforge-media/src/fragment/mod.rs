//! A movie fragment: one `moof` plus the `mdat` that follows it.
//!
//! [`Fragment`] works on a single track fragment (`traf`) with a single run
//! (`trun`). It exposes the samples with defaults resolved, can replace them
//! wholesale, infers `tfhd` defaults to shrink the run, and keeps
//! `trun.data_offset` pointing at the first byte of sample data.

mod sample;

pub use sample::{FragmentSample, Samples};

use crate::atom::{Atom, AtomType};
use crate::boxes::{Mdat, Mfhd, Sdtp, Tfdt, Tfhd, Trun, TrunEntry};
use crate::io::BoxReader;
use crate::{registry, Error, Result};
use bytes::{Bytes, BytesMut};
use std::io::{Read, Seek, Write};
use tracing::debug;

/// Default bound on data-offset recomputation passes.
pub const DEFAULT_MAX_OFFSET_ITERATIONS: usize = 5;

/// Knobs for fragment rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentOptions {
    /// Passes [`Fragment::reset_data_offset`] may take before giving up.
    pub max_offset_iterations: usize,
}

impl Default for FragmentOptions {
    fn default() -> Self {
        Self {
            max_offset_iterations: DEFAULT_MAX_OFFSET_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    header: Atom,
    data: Atom,
    options: FragmentOptions,
}

impl Fragment {
    /// Pair a `moof` atom with an `mdat` atom.
    pub fn new(header: Atom, data: Atom) -> Result<Self> {
        if header.atom_type() != AtomType::MOOF {
            return Err(Error::validation(format!(
                "fragment header must be moof, got {}",
                header.description()
            )));
        }
        if data.as_typed::<Mdat>().is_none() {
            return Err(Error::validation(format!(
                "fragment data must be mdat, got {}",
                data.description()
            )));
        }

        Ok(Self {
            header,
            data,
            options: FragmentOptions::default(),
        })
    }

    /// An empty fragment: moof(mfhd, traf(tfhd, tfdt, trun)) and an empty mdat.
    pub fn build(sequence_number: u32, track_id: u32) -> Self {
        let tfhd = Tfhd {
            default_base_is_moof: true,
            ..Tfhd::new(track_id)
        };

        let mut traf = Atom::container(AtomType::TRAF);
        traf.set_children(vec![
            Atom::new(tfhd),
            Atom::new(Tfdt::new(0)),
            Atom::new(Trun::default()),
        ]);
        let mut moof = Atom::container(AtomType::MOOF);
        moof.set_children(vec![Atom::new(Mfhd::new(sequence_number)), traf]);

        Self {
            header: moof,
            data: Atom::new(Mdat::default()),
            options: FragmentOptions::default(),
        }
    }

    /// Read a `moof` followed immediately by an `mdat`.
    pub fn read<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = registry::parse_expected_type(reader, AtomType::MOOF)?;
        let data = Atom::parse_expected::<Mdat, R>(reader)?;
        Self::new(header, data)
    }

    pub fn with_options(mut self, options: FragmentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &FragmentOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: FragmentOptions) {
        self.options = options;
    }

    /// The `moof` atom.
    pub fn header(&self) -> &Atom {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Atom {
        &mut self.header
    }

    /// The `mdat` atom.
    pub fn data(&self) -> &Atom {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Atom {
        &mut self.data
    }

    pub fn into_parts(self) -> (Atom, Atom) {
        (self.header, self.data)
    }

    pub fn is_dirty(&self) -> bool {
        self.header.is_dirty() || self.data.is_dirty()
    }

    pub fn sequence_number(&self) -> Result<u32> {
        Ok(self.header.single::<Mfhd>()?.sequence_number)
    }

    /// The single `traf` of this fragment.
    pub fn track(&self) -> Result<&Atom> {
        self.header.child(AtomType::TRAF)
    }

    pub fn track_mut(&mut self) -> Result<&mut Atom> {
        self.header.child_mut(AtomType::TRAF)
    }

    pub fn tfhd(&self) -> Result<&Tfhd> {
        self.track()?.single::<Tfhd>()
    }

    pub fn tfhd_mut(&mut self) -> Result<&mut Tfhd> {
        self.track_mut()?.single_mut::<Tfhd>()
    }

    pub fn trun(&self) -> Result<&Trun> {
        self.track()?.single::<Trun>()
    }

    pub fn trun_mut(&mut self) -> Result<&mut Trun> {
        self.track_mut()?.single_mut::<Trun>()
    }

    pub fn tfdt(&self) -> Option<&Tfdt> {
        self.track().ok()?.find::<Tfdt>()
    }

    pub fn sdtp(&self) -> Option<&Sdtp> {
        self.track().ok()?.find::<Sdtp>()
    }

    /// Raw sample bytes.
    pub fn mdat_data(&self) -> &Bytes {
        // Checked in `new`; `build` always uses an mdat payload.
        static EMPTY: Bytes = Bytes::new();
        self.data.as_typed::<Mdat>().map_or(&EMPTY, |m| &m.data)
    }

    /// Samples with durations, sizes and flags resolved against `tfhd`.
    pub fn samples(&self) -> Result<Samples<'_>> {
        let track = self.track()?;
        Ok(Samples::new(
            track.single::<Tfhd>()?,
            track.single::<Trun>()?,
            track.find::<Sdtp>(),
            self.mdat_data(),
        ))
    }

    /// Replace every sample.
    ///
    /// The batch is checked before anything changes: each sample's data must
    /// match its size, and dependency info and composition offsets must be
    /// present on all samples or on none. Existing `tfhd` defaults and
    /// `first_sample_flags` are dropped and every entry is written out
    /// explicitly; see [`set_sample_defaults`](Self::set_sample_defaults).
    pub fn set_samples(&mut self, samples: Vec<FragmentSample>) -> Result<()> {
        for (index, sample) in samples.iter().enumerate() {
            if sample.data.len() as u64 != sample.size as u64 {
                return Err(Error::validation(format!(
                    "sample {} declares {} bytes but carries {}",
                    index,
                    sample.size,
                    sample.data.len()
                )));
            }
        }

        let with_dependency = samples.iter().filter(|s| s.dependency.is_some()).count();
        if with_dependency != 0 && with_dependency != samples.len() {
            return Err(Error::validation(format!(
                "{} of {} samples carry dependency info; expected all or none",
                with_dependency,
                samples.len()
            )));
        }

        let entries = samples
            .iter()
            .map(|s| TrunEntry {
                duration: Some(s.duration),
                size: Some(s.size),
                flags: Some(s.flags),
                composition_offset: s.composition_offset,
            })
            .collect();
        let mut run = Trun::new(entries)?;

        let negative_offsets = samples
            .iter()
            .any(|s| s.composition_offset.is_some_and(|o| o < 0));
        let dependencies = (with_dependency != 0).then(|| {
            Sdtp::new(samples.iter().filter_map(|s| s.dependency).collect())
        });

        let track = self.track_mut()?;
        // Checked up front so nothing below can fail half way.
        track.single::<Tfhd>()?;
        track.single::<Trun>()?;

        let tfhd = track.single_mut::<Tfhd>()?;
        tfhd.default_sample_duration = None;
        tfhd.default_sample_size = None;
        tfhd.default_sample_flags = None;

        let trun = track.single_mut::<Trun>()?;
        run.version = if negative_offsets { 1 } else { trun.version };
        run.data_offset = trun.data_offset;
        *trun = run;

        track.remove_children(|c| c.atom_type() == AtomType::SDTP);
        if let Some(sdtp) = dependencies {
            track.add_child(Atom::new(sdtp))?;
        }

        let mut buffer = BytesMut::with_capacity(samples.iter().map(|s| s.data.len()).sum());
        for sample in &samples {
            buffer.extend_from_slice(&sample.data);
        }
        if let Some(mdat) = self.data.as_typed_mut::<Mdat>() {
            mdat.data = buffer.freeze();
        }

        debug!("replaced fragment samples with {}", samples.len());
        Ok(())
    }

    /// Move values shared by every sample into `tfhd` defaults.
    ///
    /// Duration and size become defaults when at least two samples agree on
    /// them. Flags become a default when there are at least three samples and
    /// all but the first agree; a differing first sample is kept in
    /// `trun.first_sample_flags`.
    pub fn set_sample_defaults(&mut self) -> Result<()> {
        let samples = self.samples()?.collect::<Result<Vec<_>>>()?;

        let default_duration = shared(&samples, 2, |s| s.duration);
        let default_size = shared(&samples, 2, |s| s.size);
        let default_flags = if samples.len() >= 3 {
            shared(&samples[1..], 2, |s| s.flags)
        } else {
            None
        };
        let first_sample_flags = default_flags
            .filter(|flags| samples[0].flags != *flags)
            .map(|_| samples[0].flags);

        debug!(
            "sample defaults: duration={:?} size={:?} flags={:?} first_sample_flags={:?}",
            default_duration, default_size, default_flags, first_sample_flags
        );

        let entries = samples
            .iter()
            .map(|s| TrunEntry {
                duration: default_duration.is_none().then_some(s.duration),
                size: default_size.is_none().then_some(s.size),
                flags: default_flags.is_none().then_some(s.flags),
                composition_offset: s.composition_offset,
            })
            .collect();

        let track = self.track_mut()?;
        let trun = track.single_mut::<Trun>()?;
        trun.set_entries(entries)?;
        trun.first_sample_flags = first_sample_flags;

        let tfhd = track.single_mut::<Tfhd>()?;
        tfhd.default_sample_duration = default_duration;
        tfhd.default_sample_size = default_size;
        tfhd.default_sample_flags = default_flags;
        Ok(())
    }

    /// Offset from the first byte of `moof` to the first byte of sample data.
    pub fn compute_mdat_byte0_offset(&self) -> u64 {
        self.header.compute_size() + self.data.header_size()
    }

    /// Point `trun.data_offset` at the first sample byte, relative to `moof`.
    ///
    /// Setting the offset can change the size of `moof` itself, so this
    /// repeats until the offset is stable. Returns the number of passes.
    pub fn reset_data_offset(&mut self) -> Result<usize> {
        let attempts = self.options.max_offset_iterations;

        for attempt in 1..=attempts {
            let offset = self.compute_mdat_byte0_offset();
            let data_offset = i32::try_from(offset).map_err(|_| {
                Error::validation(format!("data offset {} does not fit in 32 bits", offset))
            })?;

            let track = self.track_mut()?;
            track.single_mut::<Tfhd>()?.base_data_offset = None;
            track.single_mut::<Trun>()?.data_offset = Some(data_offset);

            let settled = self.compute_mdat_byte0_offset();
            debug!(
                "data offset pass {}: set {}, layout now gives {}",
                attempt, offset, settled
            );
            if settled == offset {
                return Ok(attempt);
            }
        }

        Err(Error::OffsetConvergence { attempts })
    }

    /// Write `moof` then `mdat`, optionally inferring sample defaults first.
    /// The data offset is always recomputed.
    pub fn write_to<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        set_sample_defaults: bool,
    ) -> Result<()> {
        if set_sample_defaults {
            self.set_sample_defaults()?;
        }
        self.reset_data_offset()?;
        self.header.write_to(writer)?;
        self.data.write_to(writer)
    }

    pub fn to_bytes(&mut self, set_sample_defaults: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out, set_sample_defaults)?;
        Ok(out)
    }
}

/// The value every sample agrees on, if there are at least `min` samples.
fn shared<T: PartialEq + Copy>(
    samples: &[FragmentSample],
    min: usize,
    field: impl Fn(&FragmentSample) -> T,
) -> Option<T> {
    let first = field(samples.first()?);
    (samples.len() >= min && samples.iter().all(|s| field(s) == first)).then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::SdtpEntry;

    const FLAGS_SYNC: u32 = 0x0200_0000;
    const FLAGS_NON_SYNC: u32 = 0x0101_0000;

    fn three_samples(flags: [u32; 3]) -> Vec<FragmentSample> {
        flags
            .iter()
            .enumerate()
            .map(|(i, f)| FragmentSample::new(4000, *f, vec![i as u8; 1000]))
            .collect()
    }

    #[test]
    fn test_build_is_well_formed() {
        let mut fragment = Fragment::build(7, 2);
        assert_eq!(fragment.sequence_number().unwrap(), 7);
        assert_eq!(fragment.tfhd().unwrap().track_id, 2);
        assert_eq!(fragment.samples().unwrap().count(), 0);

        let bytes = fragment.to_bytes(false).unwrap();
        assert!(!fragment.is_dirty());
        assert_eq!(&bytes[4..8], b"moof");
    }

    #[test]
    fn test_set_samples_then_read_back() {
        let mut fragment = Fragment::build(1, 1);
        let samples = three_samples([FLAGS_SYNC, FLAGS_NON_SYNC, FLAGS_NON_SYNC]);
        fragment.set_samples(samples.clone()).unwrap();

        let read: Vec<_> = fragment
            .samples()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(read, samples);
        assert_eq!(fragment.mdat_data().len(), 3000);
        assert!(fragment.sdtp().is_none());
    }

    #[test]
    fn test_set_samples_rejects_size_mismatch_without_mutating() {
        let mut fragment = Fragment::build(1, 1);
        fragment
            .set_samples(three_samples([FLAGS_SYNC; 3]))
            .unwrap();
        let before = fragment.clone();

        let mut bad = three_samples([FLAGS_SYNC; 3]);
        bad[2].size = 999;
        assert!(matches!(
            fragment.set_samples(bad),
            Err(Error::Validation(_))
        ));
        assert_eq!(fragment, before);
    }

    #[test]
    fn test_set_samples_requires_uniform_dependency_info() {
        let mut fragment = Fragment::build(1, 1);
        let dependency = SdtpEntry::new(0, 2, 0, 0).unwrap();
        let mut samples = three_samples([FLAGS_SYNC; 3]);
        samples[0].dependency = Some(dependency);
        assert!(fragment.set_samples(samples.clone()).is_err());

        for sample in &mut samples {
            sample.dependency = Some(dependency);
        }
        fragment.set_samples(samples).unwrap();
        assert_eq!(fragment.sdtp().unwrap().entries.len(), 3);

        fragment
            .set_samples(three_samples([FLAGS_SYNC; 3]))
            .unwrap();
        assert!(fragment.sdtp().is_none());
    }

    #[test]
    fn test_defaults_with_differing_first_flags() {
        let mut fragment = Fragment::build(1, 1);
        fragment
            .set_samples(three_samples([FLAGS_SYNC, FLAGS_NON_SYNC, FLAGS_NON_SYNC]))
            .unwrap();
        fragment.set_sample_defaults().unwrap();

        let tfhd = fragment.tfhd().unwrap();
        assert_eq!(tfhd.default_sample_duration, Some(4000));
        assert_eq!(tfhd.default_sample_size, Some(1000));
        assert_eq!(tfhd.default_sample_flags, Some(FLAGS_NON_SYNC));

        let trun = fragment.trun().unwrap();
        assert_eq!(trun.first_sample_flags, Some(FLAGS_SYNC));
        assert!(trun.entries().iter().all(|e| *e == TrunEntry::default()));

        // Resolved view is unchanged.
        let flags: Vec<_> = fragment
            .samples()
            .unwrap()
            .map(|s| s.unwrap().flags)
            .collect();
        assert_eq!(flags, [FLAGS_SYNC, FLAGS_NON_SYNC, FLAGS_NON_SYNC]);
    }

    #[test]
    fn test_no_flag_default_for_two_samples() {
        let mut fragment = Fragment::build(1, 1);
        let samples = vec![
            FragmentSample::new(10, FLAGS_SYNC, vec![0u8; 4]),
            FragmentSample::new(10, FLAGS_SYNC, vec![0u8; 5]),
        ];
        fragment.set_samples(samples).unwrap();
        fragment.set_sample_defaults().unwrap();

        let tfhd = fragment.tfhd().unwrap();
        assert_eq!(tfhd.default_sample_duration, Some(10));
        assert_eq!(tfhd.default_sample_size, None);
        assert_eq!(tfhd.default_sample_flags, None);
        let entry = fragment.trun().unwrap().entries()[1];
        assert_eq!(entry.size, Some(5));
        assert_eq!(entry.flags, Some(FLAGS_SYNC));
    }

    #[test]
    fn test_reset_data_offset_converges() {
        let mut fragment = Fragment::build(1, 1);
        fragment
            .set_samples(three_samples([FLAGS_SYNC; 3]))
            .unwrap();

        // Adding data_offset grows trun by 4 bytes, so one extra pass.
        assert_eq!(fragment.reset_data_offset().unwrap(), 2);
        assert_eq!(fragment.reset_data_offset().unwrap(), 1);

        let expected = fragment.compute_mdat_byte0_offset();
        assert_eq!(
            fragment.trun().unwrap().data_offset,
            Some(expected as i32)
        );
    }

    #[test]
    fn test_reset_data_offset_gives_up() {
        let mut fragment = Fragment::build(1, 1).with_options(FragmentOptions {
            max_offset_iterations: 1,
        });
        let err = fragment.reset_data_offset().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, Error::OffsetConvergence { attempts: 1 }));
    }

    #[test]
    fn test_new_rejects_wrong_types() {
        let moof = Atom::container(AtomType::MOOF);
        let free = Atom::opaque(AtomType::FREE, Bytes::new());
        assert!(Fragment::new(moof.clone(), free).is_err());
        assert!(Fragment::new(Atom::new(Mdat::default()), moof).is_err());
    }
}
