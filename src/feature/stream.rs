//! Lazy iteration over the members of a feature collection

use super::reader::{CollectionEvent, CollectionState};
use super::{FeatureMember, FeatureReader, Property};
use crate::crs::Crs;
use crate::error::Result;
use crate::geometry::Envelope;
use crate::namespaces::QName;
use crate::reference::DocumentIdContext;
use crate::xml::{XmlCursor, XmlEvent};
use tracing::{debug, warn};

/// Iterator over the members of a feature collection.
///
/// Members are parsed one at a time as the iterator advances; nothing but
/// the collection's own properties is kept. Once the collection's end tag is
/// reached the cursor is moved past it. Dropping an unfinished stream skips
/// the rest of the collection so the underlying reader can carry on after
/// it; use [`close`](FeatureStream::close) to see errors from that skip.
///
/// Unless members are retained, each member is dropped from the identity
/// context once it has been returned, so references between members only
/// resolve when the target comes first and is still referenced inline.
pub struct FeatureStream<'r, 'a> {
    reader: &'r FeatureReader,
    cursor: &'r mut XmlCursor<'a>,
    ids: &'r mut DocumentIdContext,
    state: CollectionState,
    depth: usize,
    bounded_by: Option<Envelope>,
    properties: Vec<Property>,
    retain: bool,
    baseline: usize,
    members: usize,
    finished: bool,
}

impl<'r, 'a> FeatureStream<'r, 'a> {
    /// Open a stream on the collection start tag at the cursor
    pub(crate) fn new(
        reader: &'r FeatureReader,
        cursor: &'r mut XmlCursor<'a>,
        ids: &'r mut DocumentIdContext,
        crs: Option<&Crs>,
        retain: bool,
    ) -> Result<Self> {
        let state = reader.start_collection(cursor, crs)?;
        debug!(collection = %state.name, "streaming feature collection");
        Ok(Self {
            depth: cursor.depth(),
            baseline: ids.object_count(),
            reader,
            cursor,
            ids,
            state,
            bounded_by: None,
            properties: Vec::new(),
            retain,
            members: 0,
            finished: false,
        })
    }

    /// Collection element name
    pub fn name(&self) -> &QName {
        &self.state.name
    }

    /// Collection id
    pub fn id(&self) -> Option<&str> {
        self.state.id.as_deref()
    }

    /// The collection's `gml:boundedBy`, once it has been read
    pub fn bounded_by(&self) -> Option<&Envelope> {
        self.bounded_by.as_ref()
    }

    /// Non-member collection properties read so far
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Number of members returned so far
    pub fn members_read(&self) -> usize {
        self.members
    }

    /// True once the end of the collection was reached or an error occurred
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Skip whatever is left of the collection and move past its end tag
    pub fn close(mut self) -> Result<()> {
        self.skip_rest()
    }

    fn skip_rest(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let target = self.depth.saturating_sub(1);
        while !(self.cursor.is_end() && self.cursor.depth() == target) {
            let exhausted = matches!(self.cursor.next()?, XmlEvent::EndDocument);
            if exhausted {
                return Err(self.cursor.parse_error("Unexpected end of document in feature collection"));
            }
        }
        self.cursor.next()?;
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<FeatureMember>> {
        loop {
            match self
                .reader
                .next_collection_event(self.cursor, self.ids, &mut self.state)?
            {
                CollectionEvent::Member(member) => {
                    if !self.retain {
                        self.ids.truncate_objects(self.baseline);
                    }
                    self.members += 1;
                    return Ok(Some(member));
                }
                CollectionEvent::BoundedBy(envelope) => self.bounded_by = envelope,
                CollectionEvent::Property(property) => self.properties.push(property),
                CollectionEvent::End => {
                    self.finished = true;
                    self.cursor.next()?;
                    debug!(collection = %self.state.name, members = self.members, "feature stream finished");
                    return Ok(None);
                }
            }
        }
    }
}

impl Iterator for FeatureStream<'_, '_> {
    type Item = Result<FeatureMember>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(member) => member.map(Ok),
            Err(err) => {
                // the cursor position is unknown after an error
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl Drop for FeatureStream<'_, '_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(
            collection = %self.state.name,
            members = self.members,
            "feature stream abandoned, skipping the rest of the collection"
        );
        if let Err(err) = self.skip_rest() {
            warn!(error = %err, "failed to skip the rest of the feature collection");
        }
    }
}

impl std::fmt::Debug for FeatureStream<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStream")
            .field("collection", &self.state.name)
            .field("members", &self.members)
            .field("finished", &self.finished)
            .finish()
    }
}
