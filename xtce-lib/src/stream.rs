//! Identify and process the container matching each packet of a stream.
use rayon::prelude::*;
use tracing::debug;

use crate::{
    database::{ContainerId, Stream, StreamId},
    ContainerContentModel, ContentProcessor, Database, Error, ProcessOptions, RawBits, Result,
};

/// Processes data belonging to one stream of a [Database].
///
/// Candidate containers are the concrete containers derived from the stream's root
/// container, most derived first. The first candidate whose restrictions, and those of its
/// ancestors, hold for the data is the identified container.
#[derive(Debug, Clone, Copy)]
pub struct StreamProcessor<'db> {
    processor: ContentProcessor<'db>,
    stream: &'db Stream,
}

impl<'db> StreamProcessor<'db> {
    #[must_use]
    pub fn new(db: &'db Database, stream: StreamId) -> Self {
        StreamProcessor {
            processor: ContentProcessor::new(db),
            stream: db.stream_by_id(stream),
        }
    }

    #[must_use]
    pub fn candidates(&self) -> &'db [ContainerId] {
        &self.stream.candidates
    }

    /// The container matching `bits`, if any.
    ///
    /// # Errors
    /// Structural problems evaluating a candidate.
    pub fn identify(&self, bits: &RawBits) -> Result<Option<ContainerId>> {
        for candidate in self.candidates() {
            if self.processor.is_processing_compatible(*candidate, bits)? {
                debug!(
                    stream = %self.stream.path,
                    container = %self.processor.database().container_by_id(*candidate).path,
                    "identified container"
                );
                return Ok(Some(*candidate));
            }
        }
        Ok(None)
    }

    fn identify_or_fail(&self, bits: &RawBits) -> Result<ContainerId> {
        self.identify(bits)?
            .ok_or_else(|| Error::NoCompatibleContainer {
                stream: self.stream.path.clone(),
            })
    }

    fn process(&self, container: ContainerId, bits: &RawBits) -> Result<ContainerContentModel> {
        let options = ProcessOptions::builder().bits(bits.clone()).build();
        self.processor.process_container(container, &options)
    }

    /// Identify and decode the container for `bits`.
    ///
    /// # Errors
    /// [Error::NoCompatibleContainer] if no candidate matches.
    pub fn process_stream(&self, bits: &RawBits) -> Result<ContainerContentModel> {
        let container = self.identify_or_fail(bits)?;
        self.process(container, bits)
    }

    /// Like [StreamProcessor::process_stream] but only decodes when the identified container
    /// is, or derives from, one of `include`. Otherwise `Ok(None)`.
    ///
    /// # Errors
    /// [Error::NoCompatibleContainer] if no candidate matches.
    pub fn process_stream_include_only(
        &self,
        bits: &RawBits,
        include: &[ContainerId],
    ) -> Result<Option<ContainerContentModel>> {
        let container = self.identify_or_fail(bits)?;
        if !self.is_any_of(container, include) {
            return Ok(None);
        }
        self.process(container, bits).map(Some)
    }

    /// Like [StreamProcessor::process_stream] but does not decode when the identified
    /// container is, or derives from, one of `exclude`, returning `Ok(None)`.
    ///
    /// # Errors
    /// [Error::NoCompatibleContainer] if no candidate matches.
    pub fn process_stream_with_excludes(
        &self,
        bits: &RawBits,
        exclude: &[ContainerId],
    ) -> Result<Option<ContainerContentModel>> {
        let container = self.identify_or_fail(bits)?;
        if self.is_any_of(container, exclude) {
            return Ok(None);
        }
        self.process(container, bits).map(Some)
    }

    /// Process many packets in parallel, preserving order.
    pub fn process_many(&self, packets: &[RawBits]) -> Vec<Result<ContainerContentModel>> {
        packets
            .par_iter()
            .map(|bits| self.process_stream(bits))
            .collect()
    }

    fn is_any_of(&self, container: ContainerId, set: &[ContainerId]) -> bool {
        let db = self.processor.database();
        set.iter().any(|c| db.inherits_from(container, *c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::sample_db;

    fn bits(hex: &str) -> RawBits {
        RawBits::from_hex(hex).unwrap()
    }

    #[test]
    fn most_derived_candidate_is_identified() {
        let db = sample_db();
        let sp = StreamProcessor::new(&db, db.stream("TLM").unwrap());
        let extended = db.container("Extended").unwrap();

        let model = sp.process_stream(&bits("0x0064c000000300010002")).unwrap();
        assert_eq!(model.container(), extended);
        assert_eq!(model.container_path(), "/Sample/Payload/Extended");
        assert_eq!(model.total_size(), 80);
    }

    #[test]
    fn no_compatible_container() {
        let db = sample_db();
        let sp = StreamProcessor::new(&db, db.stream("TLM").unwrap());
        let err = sp.process_stream(&bits("0x0065c000000300010002")).unwrap_err();
        assert!(matches!(err, Error::NoCompatibleContainer { stream } if stream == "/Sample/TLM"));
        assert_eq!(sp.identify(&bits("0x0065c0000003")).unwrap(), None);
    }

    #[test]
    fn include_and_exclude() {
        let db = sample_db();
        let sp = StreamProcessor::new(&db, db.stream("TLM").unwrap());
        let status = db.container("Status").unwrap();
        let extended = db.container("Extended").unwrap();
        let packet = bits("0x0064c000000300010002");

        assert!(sp
            .process_stream_include_only(&packet, &[status])
            .unwrap()
            .is_some());
        assert!(sp
            .process_stream_include_only(&packet, &[])
            .unwrap()
            .is_none());
        assert!(sp
            .process_stream_with_excludes(&packet, &[extended])
            .unwrap()
            .is_none());
        assert!(sp
            .process_stream_with_excludes(&packet, &[])
            .unwrap()
            .is_some());
    }

    #[test]
    fn many_packets_in_order() {
        let db = sample_db();
        let sp = StreamProcessor::new(&db, db.stream("TLM").unwrap());
        let packets: Vec<RawBits> = (0..50u16)
            .map(|i| bits(&format!("0x0064c000000300{:02x}0002", i % 2 * 100 + 1)))
            .collect();
        let models = sp.process_many(&packets);
        assert_eq!(models.len(), 50);
        for (i, model) in models.into_iter().enumerate() {
            let model = model.unwrap();
            let expected = if i % 2 == 0 { "1" } else { "101" };
            assert_eq!(
                model.content_list()[7].value.as_ref().unwrap().to_string(),
                expected
            );
        }
    }
}
