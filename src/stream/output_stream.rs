use crate::constants::{
    ENCAPSULATION_HEADER_SIZE, MAX_SHORT_SIZE, OPTIONAL_END_MARKER, OPTIONAL_TAG_ESCAPE, SIZE_ESCAPE,
    SLICE_FLAG_HAS_INDIRECTION_TABLE, SLICE_FLAG_HAS_OPTIONAL_MEMBERS, SLICE_FLAG_HAS_SLICE_SIZE,
    SLICE_FLAG_HAS_TYPE_ID_COMPACT, SLICE_FLAG_HAS_TYPE_ID_INDEX, SLICE_FLAG_HAS_TYPE_ID_STRING,
    SLICE_FLAG_IS_LAST_SLICE,
};
use crate::slicing::{
    InstanceKind, SliceDescriptor, SliceInfo, SliceState, UserException, Value, ValueGraph, ValueId,
};
use crate::stream::{EncodingVersion, OptionalFormat, StreamError, StreamWrite};
use std::collections::{HashMap, VecDeque};

#[derive(Default)]
struct EncapsWriteState {
    start: usize,
    wire_ids: HashMap<ValueId, i32>,
    pending: VecDeque<ValueId>,
    type_ids: HashMap<String, usize>,
    last_tag: Option<i32>,
}

impl EncapsWriteState {
    /// Instance ids are assigned in first-reference order, starting at 1.
    /// A newly seen instance is queued for the next batch.
    fn wire_id_for(&mut self, id: ValueId) -> i32 {
        if let Some(wire_id) = self.wire_ids.get(&id) {
            return *wire_id;
        }
        let wire_id = self.wire_ids.len() as i32 + 1;
        self.wire_ids.insert(id, wire_id);
        self.pending.push_back(id);
        wire_id
    }
}

struct SliceWriteState {
    flags_pos: usize,
    flags: u8,
    size_pos: usize,
    indirection: Vec<i32>,
    needs_end_marker: bool,
    last_tag: Option<i32>,
}

struct InstanceWriteState {
    kind: InstanceKind,
    state: SliceState,
    slice: Option<SliceWriteState>,
}

/// Encoder for the sliced binary format.
///
/// Primitive writes append little-endian bytes. Class instances are never
/// written inline: [`write_value`](Self::write_value) records a reference
/// and queues the instance, and [`write_pending_values`](Self::write_pending_values)
/// emits queued instances in batches until none remain.
#[derive(Default)]
pub struct OutputStream {
    buf: Vec<u8>,
    encapsulations: Vec<EncapsWriteState>,
    instance: Option<InstanceWriteState>,
}

impl OutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finished(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_byte(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn write_short(&mut self, value: i16) {
        self.write_raw(&value.to_le_bytes());
    }

    pub fn write_int(&mut self, value: i32) {
        self.write_raw(&value.to_le_bytes());
    }

    pub fn write_long(&mut self, value: i64) {
        self.write_raw(&value.to_le_bytes());
    }

    pub fn write_float(&mut self, value: f32) {
        self.write_raw(&value.to_le_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.write_raw(&value.to_le_bytes());
    }

    /// Compact size: one byte below 255, otherwise 255 followed by an i32.
    pub fn write_size(&mut self, size: usize) -> Result<(), StreamError> {
        if size <= MAX_SHORT_SIZE {
            self.buf.push(size as u8);
            return Ok(());
        }
        let size = i32::try_from(size).map_err(|_| StreamError::SizeOverflow(size))?;
        self.buf.push(SIZE_ESCAPE);
        self.write_int(size);
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), StreamError> {
        self.write_size(value.len())?;
        self.write_raw(value.as_bytes());
        Ok(())
    }

    pub fn write_byte_seq(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.write_size(bytes.len())?;
        self.write_raw(bytes);
        Ok(())
    }

    pub fn write<T: StreamWrite + ?Sized>(&mut self, value: &T) -> Result<(), StreamError> {
        value.write_to(self)
    }

    /// Enumerators travel as compact sizes.
    pub fn write_enum(&mut self, value: i32, max: i32) -> Result<(), StreamError> {
        if value < 0 || value > max {
            return Err(StreamError::EnumOutOfRange { value, max });
        }
        self.write_size(value as usize)
    }

    /// Facets are encoded as a sequence holding zero or one string.
    pub fn write_facet(&mut self, facet: &str) -> Result<(), StreamError> {
        if facet.is_empty() {
            return self.write_size(0);
        }
        self.write_size(1)?;
        self.write_string(facet)
    }

    /// Overwrites four bytes at `pos` with `value`.
    pub fn rewrite_int(&mut self, pos: usize, value: i32) -> Result<(), StreamError> {
        let slot = self
            .buf
            .get_mut(pos..pos + 4)
            .ok_or_else(|| StreamError::Marshal(format!("no reserved int at offset {pos}")))?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Reserves a 4-byte size to be filled in by [`end_size`](Self::end_size).
    pub fn start_size(&mut self) -> usize {
        let pos = self.buf.len();
        self.write_raw(&[0; 4]);
        pos
    }

    /// Fills a reserved size with the number of bytes written after it.
    pub fn end_size(&mut self, pos: usize) -> Result<(), StreamError> {
        let size = self.buf.len() - pos - 4;
        let size = i32::try_from(size).map_err(|_| StreamError::SizeOverflow(size))?;
        self.rewrite_int(pos, size)
    }

    pub fn start_encapsulation(&mut self) {
        let start = self.buf.len();
        self.write_raw(&[0; 4]);
        self.write_byte(EncodingVersion::CURRENT.major);
        self.write_byte(EncodingVersion::CURRENT.minor);
        self.encapsulations.push(EncapsWriteState {
            start,
            ..EncapsWriteState::default()
        });
    }

    pub fn end_encapsulation(&mut self) -> Result<(), StreamError> {
        let state = self
            .encapsulations
            .pop()
            .ok_or(StreamError::EncapsulationState("no encapsulation is open"))?;
        if !state.pending.is_empty() {
            return Err(StreamError::EncapsulationState(
                "class instances were referenced but never written",
            ));
        }
        let size = self.buf.len() - state.start;
        let size = i32::try_from(size).map_err(|_| StreamError::SizeOverflow(size))?;
        self.rewrite_int(state.start, size)
    }

    pub fn write_empty_encapsulation(&mut self) {
        self.write_int(ENCAPSULATION_HEADER_SIZE as i32);
        self.write_byte(EncodingVersion::CURRENT.major);
        self.write_byte(EncodingVersion::CURRENT.minor);
    }

    /// Writes the header for optional member `tag`. Tags must be written in
    /// ascending order within a slice or an encapsulation.
    ///
    /// Returns `false` and writes nothing when neither a slice nor an
    /// encapsulation is open: a bare stream has no end marker to bound
    /// optional members, so the member is suppressed.
    pub fn write_optional(&mut self, tag: i32, format: OptionalFormat) -> Result<bool, StreamError> {
        if tag < 0 {
            return Err(StreamError::Marshal(format!("invalid optional tag {tag}")));
        }
        let slice = self
            .instance
            .as_mut()
            .and_then(|instance| instance.slice.as_mut());
        let last_tag = match slice {
            Some(slice) => {
                slice.flags |= SLICE_FLAG_HAS_OPTIONAL_MEMBERS;
                slice.needs_end_marker = true;
                &mut slice.last_tag
            }
            None => match self.encapsulations.last_mut() {
                Some(encaps) => &mut encaps.last_tag,
                None => {
                    tracing::trace!(tag, "optional member suppressed outside an encapsulation");
                    return Ok(false);
                }
            },
        };
        if let Some(previous) = *last_tag {
            if tag <= previous {
                return Err(StreamError::OptionalTagOrder { tag, previous });
            }
        }
        *last_tag = Some(tag);

        let format = u8::from(format);
        if tag < OPTIONAL_TAG_ESCAPE as i32 {
            self.buf.push(format | ((tag as u8) << 3));
        } else {
            self.buf.push(format | (OPTIONAL_TAG_ESCAPE << 3));
            self.write_size(tag as usize)?;
        }
        Ok(true)
    }

    /// Writes `value` as optional member `tag`; `None` writes nothing.
    pub fn write_optional_value<T: StreamWrite + ?Sized>(
        &mut self,
        tag: i32,
        value: Option<&T>,
    ) -> Result<(), StreamError> {
        let Some(value) = value else {
            return Ok(());
        };
        if !self.write_optional(tag, T::OPTIONAL_FORMAT)? {
            return Ok(());
        }
        match T::OPTIONAL_FORMAT {
            OptionalFormat::FSize => {
                let pos = self.start_size();
                value.write_to(self)?;
                self.end_size(pos)
            }
            OptionalFormat::VSize if T::VSIZE_PREFIXED => {
                let len = value.vsize_payload_len().ok_or_else(|| {
                    StreamError::Marshal(format!("optional tag {tag} has no fixed payload size"))
                })?;
                self.write_size(len)?;
                value.write_to(self)
            }
            _ => value.write_to(self),
        }
    }

    pub fn write_optional_enum(
        &mut self,
        tag: i32,
        value: Option<i32>,
        max: i32,
    ) -> Result<(), StreamError> {
        let Some(value) = value else {
            return Ok(());
        };
        if !self.write_optional(tag, OptionalFormat::Size)? {
            return Ok(());
        }
        self.write_enum(value, max)
    }

    pub fn write_optional_value_ref(
        &mut self,
        tag: i32,
        value: Option<ValueId>,
    ) -> Result<(), StreamError> {
        let Some(value) = value else {
            return Ok(());
        };
        if !self.write_optional(tag, OptionalFormat::Class)? {
            return Ok(());
        }
        self.write_value(Some(value))
    }

    /// Writes a reference to a class instance held in a [`ValueGraph`].
    ///
    /// Inside a slice the reference is an index into the slice's
    /// indirection table; elsewhere it is the instance id itself. `None`
    /// is the null reference.
    pub fn write_value(&mut self, value: Option<ValueId>) -> Result<(), StreamError> {
        if let Some(instance) = &self.instance {
            if instance.kind == InstanceKind::Exception {
                return Err(StreamError::Marshal(
                    "exceptions cannot carry class members".into(),
                ));
            }
        }
        let Some(id) = value else {
            return self.write_size(0);
        };
        let wire_id = self
            .encapsulations
            .last_mut()
            .ok_or(StreamError::NoEncapsulation)?
            .wire_id_for(id);

        let reference = match self.current_slice_mut() {
            Some(slice) => {
                let index = match slice.indirection.iter().position(|entry| *entry == wire_id) {
                    Some(index) => index,
                    None => {
                        slice.indirection.push(wire_id);
                        slice.indirection.len() - 1
                    }
                };
                index + 1
            }
            None => wire_id as usize,
        };
        self.write_size(reference)
    }

    /// Emits every queued instance, batch by batch, reusing wire ids for
    /// instances already written. The section ends with a zero count.
    ///
    /// The section is preceded by an optional end marker so that a reader
    /// can skip optional members it does not know before reaching it.
    pub fn write_pending_values(&mut self, graph: &ValueGraph) -> Result<(), StreamError> {
        if self.instance.is_some() {
            return Err(StreamError::SliceState(
                "cannot write pending values while an instance is open",
            ));
        }
        if self.encapsulations.is_empty() {
            return Err(StreamError::NoEncapsulation);
        }
        self.buf.push(OPTIONAL_END_MARKER);
        loop {
            let batch: Vec<(ValueId, i32)> = {
                let encaps = self
                    .encapsulations
                    .last_mut()
                    .ok_or(StreamError::NoEncapsulation)?;
                let ids: Vec<ValueId> = encaps.pending.drain(..).collect();
                ids.into_iter()
                    .map(|id| (id, encaps.wire_ids.get(&id).copied().unwrap_or_default()))
                    .collect()
            };
            self.write_size(batch.len())?;
            if batch.is_empty() {
                return Ok(());
            }
            tracing::trace!("writing batch of {} class instances", batch.len());
            for (id, wire_id) in batch {
                let value = graph.get(id).ok_or(StreamError::MissingValue(id))?;
                self.write_int(wire_id);
                self.write_instance(value)?;
            }
        }
    }

    pub fn write_user_exception(&mut self, exception: &dyn UserException) -> Result<(), StreamError> {
        if self.instance.is_some() {
            return Err(StreamError::SliceState("another instance is being written"));
        }
        self.instance = Some(InstanceWriteState {
            kind: InstanceKind::Exception,
            state: SliceState::AwaitingSlice,
            slice: None,
        });
        exception.write_exception_slices(self)?;
        self.finish_instance()
    }

    /// State of the instance currently being written, if any.
    pub fn slice_state(&self) -> Option<SliceState> {
        self.instance.as_ref().map(|instance| instance.state)
    }

    pub fn start_slice(
        &mut self,
        type_id: &str,
        compact_id: Option<i32>,
        is_last: bool,
    ) -> Result<(), StreamError> {
        let kind = match &self.instance {
            Some(instance) if instance.state == SliceState::AwaitingSlice => instance.kind,
            Some(instance) if instance.state == SliceState::InSlice => {
                return Err(StreamError::SliceState("previous slice was not ended"));
            }
            Some(_) => {
                return Err(StreamError::SliceState(
                    "instance already ended with its last slice",
                ));
            }
            None => return Err(StreamError::SliceState("no instance is being written")),
        };

        let flags_pos = self.buf.len();
        self.buf.push(0);
        let mut flags = SLICE_FLAG_HAS_SLICE_SIZE;
        if is_last {
            flags |= SLICE_FLAG_IS_LAST_SLICE;
        }
        flags |= self.write_slice_type_id(kind, type_id, compact_id)?;
        let size_pos = self.start_size();

        if let Some(instance) = self.instance.as_mut() {
            instance.state = SliceState::InSlice;
            instance.slice = Some(SliceWriteState {
                flags_pos,
                flags,
                size_pos,
                indirection: Vec::new(),
                needs_end_marker: false,
                last_tag: None,
            });
        }
        Ok(())
    }

    pub fn end_slice(&mut self) -> Result<(), StreamError> {
        let instance = self
            .instance
            .as_mut()
            .ok_or(StreamError::SliceState("no instance is being written"))?;
        if instance.state != SliceState::InSlice {
            return Err(StreamError::SliceState("no slice is open"));
        }
        let slice = instance
            .slice
            .take()
            .ok_or(StreamError::SliceState("no slice is open"))?;
        let is_last = slice.flags & SLICE_FLAG_IS_LAST_SLICE != 0;
        instance.state = if is_last {
            SliceState::Done
        } else {
            SliceState::AwaitingSlice
        };

        if slice.needs_end_marker {
            self.buf.push(OPTIONAL_END_MARKER);
        }
        // The slice size counts its own four bytes.
        let size = self.buf.len() - slice.size_pos;
        let size = i32::try_from(size).map_err(|_| StreamError::SizeOverflow(size))?;
        self.rewrite_int(slice.size_pos, size)?;

        let mut flags = slice.flags;
        if !slice.indirection.is_empty() {
            flags |= SLICE_FLAG_HAS_INDIRECTION_TABLE;
            self.write_size(slice.indirection.len())?;
            for wire_id in &slice.indirection {
                self.write_size(*wire_id as usize)?;
            }
        }
        self.buf[slice.flags_pos] = flags;
        Ok(())
    }

    /// Writes one slice per descriptor, most-derived first, flagging the
    /// final one as the last slice.
    pub fn write_described_slices<T>(
        &mut self,
        value: &T,
        slices: &[SliceDescriptor<T>],
    ) -> Result<(), StreamError> {
        if slices.is_empty() {
            return Err(StreamError::Marshal("type declares no slices".into()));
        }
        let last = slices.len() - 1;
        for (index, slice) in slices.iter().enumerate() {
            self.start_slice(slice.type_id, slice.compact_id, index == last)?;
            (slice.write_members)(value, self)?;
            self.end_slice()?;
        }
        Ok(())
    }

    fn write_instance(&mut self, value: &dyn Value) -> Result<(), StreamError> {
        self.instance = Some(InstanceWriteState {
            kind: InstanceKind::Value,
            state: SliceState::AwaitingSlice,
            slice: None,
        });
        if let Some(sliced_data) = value.sliced_data() {
            for info in &sliced_data.slices {
                self.write_preserved_slice(info)?;
            }
        }
        value.write_value_slices(self)?;
        self.finish_instance()
    }

    fn write_preserved_slice(&mut self, info: &SliceInfo) -> Result<(), StreamError> {
        self.start_slice(&info.type_id, info.compact_id, info.is_last_slice)?;
        self.write_raw(&info.bytes);

        let encaps = self
            .encapsulations
            .last_mut()
            .ok_or(StreamError::NoEncapsulation)?;
        let wire_ids: Vec<i32> = info
            .instances
            .iter()
            .map(|id| encaps.wire_id_for(*id))
            .collect();

        if let Some(slice) = self.current_slice_mut() {
            if info.has_optional_members {
                // The preserved bytes already end with the marker.
                slice.flags |= SLICE_FLAG_HAS_OPTIONAL_MEMBERS;
            }
            slice.indirection = wire_ids;
        }
        self.end_slice()
    }

    fn write_slice_type_id(
        &mut self,
        kind: InstanceKind,
        type_id: &str,
        compact_id: Option<i32>,
    ) -> Result<u8, StreamError> {
        if kind == InstanceKind::Exception {
            self.write_string(type_id)?;
            return Ok(SLICE_FLAG_HAS_TYPE_ID_STRING);
        }
        if let Some(compact_id) = compact_id {
            let compact_id = usize::try_from(compact_id)
                .map_err(|_| StreamError::Marshal(format!("invalid compact id {compact_id}")))?;
            self.write_size(compact_id)?;
            return Ok(SLICE_FLAG_HAS_TYPE_ID_COMPACT);
        }

        let encaps = self
            .encapsulations
            .last_mut()
            .ok_or(StreamError::NoEncapsulation)?;
        if let Some(index) = encaps.type_ids.get(type_id).copied() {
            self.write_size(index)?;
            return Ok(SLICE_FLAG_HAS_TYPE_ID_INDEX);
        }
        let index = encaps.type_ids.len() + 1;
        encaps.type_ids.insert(type_id.to_string(), index);
        self.write_string(type_id)?;
        Ok(SLICE_FLAG_HAS_TYPE_ID_STRING)
    }

    fn finish_instance(&mut self) -> Result<(), StreamError> {
        match self.instance.take() {
            Some(instance) if instance.state == SliceState::Done => Ok(()),
            _ => Err(StreamError::SliceState(
                "instance ended before its last slice",
            )),
        }
    }

    fn current_slice_mut(&mut self) -> Option<&mut SliceWriteState> {
        self.instance
            .as_mut()
            .and_then(|instance| instance.slice.as_mut())
    }
}
