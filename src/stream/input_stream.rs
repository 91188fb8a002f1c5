use crate::constants::{
    ENCAPSULATION_HEADER_SIZE, OPTIONAL_END_MARKER, OPTIONAL_FORMAT_MASK, OPTIONAL_TAG_ESCAPE,
    SIZE_ESCAPE, SLICE_FLAG_HAS_INDIRECTION_TABLE, SLICE_FLAG_HAS_OPTIONAL_MEMBERS,
    SLICE_FLAG_HAS_SLICE_SIZE, SLICE_FLAG_HAS_TYPE_ID_COMPACT, SLICE_FLAG_HAS_TYPE_ID_INDEX,
    SLICE_FLAG_HAS_TYPE_ID_STRING, SLICE_FLAG_IS_LAST_SLICE, SLICE_FLAG_TYPE_ID_MASK,
    SLICE_SIZE_FIELD_SIZE,
};
use crate::patch::{PatchTable, Patcher};
use crate::slicing::{
    ClassType, DecodedUserException, InstanceKind, SliceDescriptor, SliceInfo, SliceState,
    SlicedData, TypeRegistry, UnknownSlicedValue, Value, ValueGraph, ValueId,
};
use crate::stream::{EncodingVersion, OptionalFormat, StreamConfig, StreamError, StreamRead};
use std::collections::HashMap;

fn no_op_patcher() -> Patcher<ValueId, ValueGraph> {
    Box::new(|_: &ValueId, _: &ValueGraph| Ok(()))
}

struct EncapsReadState {
    end: usize,
    type_ids: Vec<String>,
}

struct SliceHeader {
    type_id: String,
    compact_id: Option<i32>,
    flags: u8,
    data_start: usize,
    end: usize,
    table: Vec<(i32, ValueId)>,
    table_end: usize,
}

impl SliceHeader {
    fn is_last(&self) -> bool {
        self.flags & SLICE_FLAG_IS_LAST_SLICE != 0
    }
}

struct InstanceReadState {
    kind: InstanceKind,
    state: SliceState,
    current: Option<SliceHeader>,
    /// The current header was read by the instance loop and has not yet
    /// been claimed by a `start_slice` call.
    peeked: bool,
}

impl InstanceReadState {
    fn new(kind: InstanceKind) -> Self {
        Self {
            kind,
            state: SliceState::AwaitingSlice,
            current: None,
            peeked: false,
        }
    }
}

/// Decoder for the sliced binary format.
///
/// Every read is bounds-checked against the buffer (or the innermost open
/// encapsulation) and reports malformed input as a [`StreamError`].
///
/// Class instances are decoded into a [`ValueGraph`] owned by the stream.
/// References read before their instance reserve a slot; the instance fills
/// it when [`read_pending_values`](Self::read_pending_values) reaches it.
pub struct InputStream<'a> {
    buf: &'a [u8],
    pos: usize,
    registry: Option<&'a TypeRegistry>,
    config: StreamConfig,
    encapsulations: Vec<EncapsReadState>,
    instance: Option<InstanceReadState>,
    graph: ValueGraph,
    wire_slots: HashMap<i32, ValueId>,
    patches: PatchTable<ValueId, ValueGraph>,
}

impl<'a> InputStream<'a> {
    /// A stream with no registered types; every class or exception it
    /// meets is sliced.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            registry: None,
            config: StreamConfig::default(),
            encapsulations: Vec::new(),
            instance: None,
            graph: ValueGraph::new(),
            wire_slots: HashMap::new(),
            patches: PatchTable::new(),
        }
    }

    pub fn with_registry(buf: &'a [u8], registry: &'a TypeRegistry) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new(buf)
        }
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left before the end of the buffer or the open encapsulation.
    pub fn remaining(&self) -> usize {
        self.limit().saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8], StreamError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(StreamError::UnexpectedEnd {
                needed: len,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_raw(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), StreamError> {
        self.read_raw(len).map(|_| ())
    }

    pub fn read_byte(&mut self) -> Result<u8, StreamError> {
        self.read_array::<1>().map(|[byte]| byte)
    }

    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        self.read_byte().map(|byte| byte != 0)
    }

    pub fn read_short(&mut self) -> Result<i16, StreamError> {
        self.read_array().map(i16::from_le_bytes)
    }

    pub fn read_int(&mut self) -> Result<i32, StreamError> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_long(&mut self) -> Result<i64, StreamError> {
        self.read_array().map(i64::from_le_bytes)
    }

    pub fn read_float(&mut self) -> Result<f32, StreamError> {
        self.read_array().map(f32::from_le_bytes)
    }

    pub fn read_double(&mut self) -> Result<f64, StreamError> {
        self.read_array().map(f64::from_le_bytes)
    }

    pub fn read_size(&mut self) -> Result<usize, StreamError> {
        let first = self.read_byte()?;
        if first != SIZE_ESCAPE {
            return Ok(first as usize);
        }
        let size = self.read_int()?;
        if size < 0 {
            return Err(StreamError::NegativeSize(size));
        }
        Ok(size as usize)
    }

    /// Reads a sequence count and rejects it when `count * min_element_size`
    /// exceeds what is left in the input.
    pub fn read_and_check_seq_size(&mut self, min_element_size: usize) -> Result<usize, StreamError> {
        let count = self.read_size()?;
        let needed = count.saturating_mul(min_element_size);
        let remaining = self.remaining();
        if needed > remaining {
            return Err(StreamError::SizeExceedsRemaining {
                size: needed,
                remaining,
            });
        }
        Ok(count)
    }

    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let len = self.read_and_check_seq_size(1)?;
        let bytes = self.read_raw(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| StreamError::InvalidUtf8)
    }

    pub fn read_byte_seq(&mut self) -> Result<Vec<u8>, StreamError> {
        let len = self.read_and_check_seq_size(1)?;
        self.read_raw(len).map(<[u8]>::to_vec)
    }

    pub fn read<T: StreamRead>(&mut self) -> Result<T, StreamError> {
        T::read_from(self)
    }

    pub fn read_enum(&mut self, max: i32) -> Result<i32, StreamError> {
        let value = self.read_size()?;
        match i32::try_from(value) {
            Ok(value) if value <= max => Ok(value),
            _ => Err(StreamError::EnumOutOfRange {
                value: i32::try_from(value).unwrap_or(i32::MAX),
                max,
            }),
        }
    }

    pub fn read_facet(&mut self) -> Result<String, StreamError> {
        match self.read_size()? {
            0 => Ok(String::new()),
            1 => self.read_string(),
            count => Err(StreamError::Marshal(format!(
                "facet path holds {count} entries, at most one is supported"
            ))),
        }
    }

    pub fn start_encapsulation(&mut self) -> Result<EncodingVersion, StreamError> {
        let start = self.pos;
        let end = self.encapsulation_end()?;
        self.skip(4)?;
        let major = self.read_byte()?;
        let minor = self.read_byte()?;
        let encoding = EncodingVersion::new(major, minor);
        if !encoding.is_supported() {
            self.pos = start;
            return Err(StreamError::UnsupportedEncoding { major, minor });
        }
        self.encapsulations.push(EncapsReadState {
            end,
            type_ids: Vec::new(),
        });
        Ok(encoding)
    }

    /// Closes the innermost encapsulation. Optional members the reader did
    /// not ask for are skipped; any other unread data is an error, as is a
    /// class reference that was never resolved.
    pub fn end_encapsulation(&mut self) -> Result<(), StreamError> {
        let end = self
            .encapsulations
            .last()
            .map(|encaps| encaps.end)
            .ok_or(StreamError::EncapsulationState("no encapsulation is open"))?;
        self.skip_optionals()?;
        if self.pos != end {
            return Err(StreamError::EncapsulationState(
                "encapsulation has unread data",
            ));
        }
        self.encapsulations.pop();
        self.patches.ensure_resolved()
    }

    /// Returns the complete bytes of the next encapsulation, header
    /// included, without interpreting its payload.
    pub fn read_encapsulation_raw(&mut self) -> Result<&'a [u8], StreamError> {
        let start = self.pos;
        let end = self.encapsulation_end()?;
        let major = self.buf.get(start + 4).copied().unwrap_or_default();
        let minor = self.buf.get(start + 5).copied().unwrap_or_default();
        if !EncodingVersion::new(major, minor).is_supported() {
            return Err(StreamError::UnsupportedEncoding { major, minor });
        }
        self.read_raw(end - start)
    }

    /// Validates the size field at the current position and returns the
    /// absolute end offset of the encapsulation it introduces.
    fn encapsulation_end(&mut self) -> Result<usize, StreamError> {
        let start = self.pos;
        let size = self.read_int()?;
        self.pos = start;
        if size < ENCAPSULATION_HEADER_SIZE as i32 {
            return Err(StreamError::InvalidEncapsulationSize(size));
        }
        let remaining = self.remaining();
        if size as usize > remaining {
            return Err(StreamError::SizeExceedsRemaining {
                size: size as usize,
                remaining,
            });
        }
        Ok(start + size as usize)
    }

    /// Positions the stream on the value of optional member `tag`.
    ///
    /// Unknown members with lower tags are skipped. Returns `false` without
    /// consuming anything when the member is absent, which is the case when
    /// a higher tag, the end marker, or the end of the enclosing slice or
    /// encapsulation comes first.
    pub fn read_optional(&mut self, tag: i32, expected: OptionalFormat) -> Result<bool, StreamError> {
        loop {
            let header_pos = self.pos;
            let Some((found, format)) = self.read_optional_header()? else {
                return Ok(false);
            };
            if found > tag {
                self.pos = header_pos;
                return Ok(false);
            }
            if found < tag {
                self.skip_optional(format)?;
                continue;
            }
            if format != expected {
                return Err(StreamError::OptionalFormatMismatch {
                    tag,
                    expected,
                    found: format,
                });
            }
            return Ok(true);
        }
    }

    pub fn read_optional_value<T: StreamRead>(&mut self, tag: i32) -> Result<Option<T>, StreamError> {
        if !self.read_optional(tag, T::OPTIONAL_FORMAT)? {
            return Ok(None);
        }
        match T::OPTIONAL_FORMAT {
            OptionalFormat::FSize => {
                self.skip(4)?;
            }
            OptionalFormat::VSize if T::VSIZE_PREFIXED => {
                self.read_size()?;
            }
            _ => {}
        }
        T::read_from(self).map(Some)
    }

    pub fn read_optional_enum(&mut self, tag: i32, max: i32) -> Result<Option<i32>, StreamError> {
        if !self.read_optional(tag, OptionalFormat::Size)? {
            return Ok(None);
        }
        self.read_enum(max).map(Some)
    }

    /// Reads an optional class reference. A present but null reference
    /// reads as `None`.
    pub fn read_optional_value_ref(&mut self, tag: i32) -> Result<Option<ValueId>, StreamError> {
        if !self.read_optional(tag, OptionalFormat::Class)? {
            return Ok(None);
        }
        self.read_value()
    }

    pub fn skip_optional(&mut self, format: OptionalFormat) -> Result<(), StreamError> {
        match format {
            OptionalFormat::F1 | OptionalFormat::F2 | OptionalFormat::F4 | OptionalFormat::F8 => {
                self.skip(format.fixed_width().unwrap_or_default())
            }
            OptionalFormat::Size => self.read_size().map(|_| ()),
            OptionalFormat::VSize => {
                let len = self.read_size()?;
                self.skip(len)
            }
            OptionalFormat::FSize => {
                let len = self.read_int()?;
                if len < 0 {
                    return Err(StreamError::NegativeSize(len));
                }
                self.skip(len as usize)
            }
            OptionalFormat::Class => self.read_value().map(|_| ()),
        }
    }

    /// Skips optional members up to the end marker (left unconsumed) or the
    /// end of the enclosing slice or encapsulation.
    pub fn skip_optionals(&mut self) -> Result<(), StreamError> {
        while let Some((_, format)) = self.read_optional_header()? {
            self.skip_optional(format)?;
        }
        Ok(())
    }

    fn read_optional_header(&mut self) -> Result<Option<(i32, OptionalFormat)>, StreamError> {
        if self.pos >= self.optional_limit() {
            return Ok(None);
        }
        let byte = self.buf[self.pos];
        if byte == OPTIONAL_END_MARKER {
            return Ok(None);
        }
        self.pos += 1;
        let format_code = byte & OPTIONAL_FORMAT_MASK;
        let format = OptionalFormat::try_from(format_code).map_err(|_| {
            StreamError::InvalidDiscriminant {
                kind: "optional format",
                value: format_code,
            }
        })?;
        let tag = match byte >> 3 {
            tag if tag < OPTIONAL_TAG_ESCAPE => tag as i32,
            tag if tag == OPTIONAL_TAG_ESCAPE => {
                let tag = self.read_size()?;
                i32::try_from(tag).map_err(|_| StreamError::SizeOverflow(tag))?
            }
            _ => {
                return Err(StreamError::Marshal(format!(
                    "invalid optional header byte {byte:#04x}"
                )));
            }
        };
        Ok(Some((tag, format)))
    }

    /// Reads a class reference, reserving a graph slot for instances that
    /// have not been decoded yet.
    pub fn read_value(&mut self) -> Result<Option<ValueId>, StreamError> {
        self.read_value_with(no_op_patcher())
    }

    /// Reads a class reference and registers `patcher` to run once the
    /// instance is available (immediately, if it already is).
    pub fn read_value_with(
        &mut self,
        patcher: Patcher<ValueId, ValueGraph>,
    ) -> Result<Option<ValueId>, StreamError> {
        let reference = self.read_size()?;
        if reference == 0 {
            return Ok(None);
        }
        let wire_id = match self.current_slice() {
            Some(slice) => slice
                .table
                .get(reference - 1)
                .map(|(wire_id, _)| *wire_id)
                .ok_or(StreamError::InvalidIndirection {
                    index: reference,
                    len: slice.table.len(),
                })?,
            None => i32::try_from(reference).map_err(|_| StreamError::SizeOverflow(reference))?,
        };
        let slot = self.reserve_slot(wire_id);
        self.patches.register(wire_id, patcher, &self.graph)?;
        Ok(Some(slot))
    }

    /// Reads a reference that must resolve to an instance of `T` or of a
    /// type derived from it. The check runs when the instance is decoded.
    pub fn read_value_of<T: ClassType>(&mut self) -> Result<Option<ValueId>, StreamError> {
        let expected = T::SLICES.first().map(|slice| slice.type_id).unwrap_or_default();
        self.read_value_with(Box::new(move |id: &ValueId, graph: &ValueGraph| {
            let value = graph.get(*id).ok_or(StreamError::MissingValue(*id))?;
            if value.value_type_ids().iter().any(|type_id| *type_id == expected) {
                Ok(())
            } else {
                Err(StreamError::UnexpectedValueType {
                    expected: expected.to_string(),
                    found: value.value_type_id().to_string(),
                })
            }
        }))
    }

    /// Decodes the instance section written by
    /// [`OutputStream::write_pending_values`](crate::stream::OutputStream::write_pending_values),
    /// then checks that every reference read so far has been resolved.
    pub fn read_pending_values(&mut self) -> Result<(), StreamError> {
        self.skip_optionals()?;
        if self.read_byte()? != OPTIONAL_END_MARKER {
            return Err(StreamError::Marshal(
                "expected the class instance section".into(),
            ));
        }
        loop {
            // Instance id plus at least a flags byte each.
            let count = self.read_and_check_seq_size(5)?;
            if count == 0 {
                break;
            }
            for _ in 0..count {
                let wire_id = self.read_int()?;
                if wire_id <= 0 {
                    return Err(StreamError::InvalidInstanceId(wire_id));
                }
                self.read_instance(wire_id)?;
            }
        }
        self.patches.ensure_resolved()
    }

    pub fn read_user_exception(&mut self) -> Result<DecodedUserException, StreamError> {
        self.instance = Some(InstanceReadState::new(InstanceKind::Exception));
        let mut most_derived: Option<String> = None;
        loop {
            self.read_slice_header()?;
            let type_id = self.current_header()?.type_id.clone();
            most_derived.get_or_insert_with(|| type_id.clone());

            let factory = self
                .registry
                .and_then(|registry| registry.exception_factory(&type_id));
            if let Some(factory) = factory {
                let mut exception = factory();
                self.mark_peeked();
                exception.read_exception_slices(self)?;
                self.instance = None;
                return Ok(DecodedUserException::Known {
                    exception,
                    type_id: most_derived.unwrap_or(type_id),
                });
            }

            tracing::debug!(type_id = %type_id, "slicing unknown exception slice");
            let info = self.skip_slice()?;
            if info.is_last_slice {
                self.instance = None;
                return Ok(DecodedUserException::Unknown {
                    type_id: most_derived.unwrap_or_default(),
                });
            }
        }
    }

    /// Opens the next slice, which must carry `type_id`.
    pub fn start_slice(&mut self, type_id: &str) -> Result<(), StreamError> {
        self.open_slice(type_id, None)
    }

    /// Closes the current slice: checks it did not overrun its declared
    /// size, skips any members this reader does not know about, and steps
    /// over the indirection table.
    pub fn end_slice(&mut self) -> Result<(), StreamError> {
        let instance = self
            .instance
            .as_mut()
            .ok_or(StreamError::SliceState("no instance is being read"))?;
        if instance.state != SliceState::InSlice || instance.peeked {
            return Err(StreamError::SliceState("no slice is open"));
        }
        let header = instance
            .current
            .take()
            .ok_or(StreamError::SliceState("no slice is open"))?;
        instance.state = if header.is_last() {
            SliceState::Done
        } else {
            SliceState::AwaitingSlice
        };
        if self.pos > header.end {
            return Err(StreamError::SliceOverrun {
                type_id: header.type_id,
                overrun: self.pos - header.end,
            });
        }
        self.pos = header.table_end;
        Ok(())
    }

    /// State of the instance currently being read, if any.
    pub fn slice_state(&self) -> Option<SliceState> {
        self.instance.as_ref().map(|instance| instance.state)
    }

    /// Reads one slice per descriptor, most-derived first. The last one
    /// read must be flagged as the last slice on the wire.
    pub fn read_described_slices<T>(
        &mut self,
        value: &mut T,
        slices: &[SliceDescriptor<T>],
    ) -> Result<(), StreamError> {
        for slice in slices {
            self.open_slice(slice.type_id, slice.compact_id)?;
            (slice.read_members)(value, self)?;
            self.end_slice()?;
        }
        match self.slice_state() {
            Some(SliceState::Done) => Ok(()),
            _ => Err(StreamError::SliceState(
                "instance has more base slices than its type declares",
            )),
        }
    }

    pub fn graph(&self) -> &ValueGraph {
        &self.graph
    }

    /// Hands the decoded instances to the caller, leaving an empty graph.
    pub fn take_graph(&mut self) -> ValueGraph {
        std::mem::take(&mut self.graph)
    }

    fn open_slice(&mut self, type_id: &str, compact_id: Option<i32>) -> Result<(), StreamError> {
        let peeked = match self.instance.as_mut() {
            Some(instance) if instance.peeked => {
                instance.peeked = false;
                true
            }
            Some(_) => false,
            None => return Err(StreamError::SliceState("no instance is being read")),
        };
        if !peeked {
            self.read_slice_header()?;
        }
        let header = self.current_header()?;
        let compact_matches = compact_id.is_some() && header.compact_id == compact_id;
        if header.type_id != type_id && !compact_matches {
            return Err(StreamError::SliceTypeMismatch {
                expected: type_id.to_string(),
                found: header.type_id.clone(),
            });
        }
        Ok(())
    }

    fn read_instance(&mut self, wire_id: i32) -> Result<(), StreamError> {
        self.instance = Some(InstanceReadState::new(InstanceKind::Value));
        let mut most_derived: Option<String> = None;
        let mut skipped: Vec<SliceInfo> = Vec::new();
        loop {
            self.read_slice_header()?;
            let (type_id, compact_id) = {
                let header = self.current_header()?;
                (header.type_id.clone(), header.compact_id)
            };
            most_derived.get_or_insert_with(|| match compact_id {
                Some(compact_id) if type_id.is_empty() => compact_id.to_string(),
                _ => type_id.clone(),
            });

            let factory = self
                .registry
                .and_then(|registry| registry.value_factory(&type_id));
            if let Some(factory) = factory {
                let mut value = factory();
                self.mark_peeked();
                value.read_value_slices(self)?;
                self.instance = None;
                if !skipped.is_empty() {
                    value.set_sliced_data(SlicedData::new(skipped));
                }
                return self.store_instance(wire_id, value);
            }

            tracing::debug!(type_id = %type_id, ?compact_id, "slicing unknown value slice");
            let info = self.skip_slice()?;
            let is_last = info.is_last_slice;
            if self.config.preserve_slices {
                skipped.push(info);
            }
            if is_last {
                self.instance = None;
                let value = UnknownSlicedValue::new(
                    most_derived.unwrap_or_default(),
                    SlicedData::new(skipped),
                );
                return self.store_instance(wire_id, Box::new(value));
            }
        }
    }

    fn store_instance(&mut self, wire_id: i32, value: Box<dyn Value>) -> Result<(), StreamError> {
        let slot = self.reserve_slot(wire_id);
        if self.graph.contains(slot) {
            return Err(StreamError::DuplicateInstance(wire_id));
        }
        self.graph.fill(slot, value)?;
        self.patches.resolve(wire_id, slot, &self.graph)
    }

    fn reserve_slot(&mut self, wire_id: i32) -> ValueId {
        *self
            .wire_slots
            .entry(wire_id)
            .or_insert_with(|| self.graph.reserve())
    }

    fn read_slice_header(&mut self) -> Result<(), StreamError> {
        let kind = match &self.instance {
            Some(instance) if instance.state == SliceState::AwaitingSlice => instance.kind,
            Some(instance) if instance.state == SliceState::Done => {
                return Err(StreamError::SliceState("instance has no further slices"));
            }
            Some(_) => return Err(StreamError::SliceState("previous slice was not ended")),
            None => return Err(StreamError::SliceState("no instance is being read")),
        };

        let flags = self.read_byte()?;
        let (type_id, compact_id) = match flags & SLICE_FLAG_TYPE_ID_MASK {
            SLICE_FLAG_HAS_TYPE_ID_STRING => {
                let type_id = self.read_string()?;
                if kind == InstanceKind::Value {
                    if let Some(encaps) = self.encapsulations.last_mut() {
                        encaps.type_ids.push(type_id.clone());
                    }
                }
                (type_id, None)
            }
            SLICE_FLAG_HAS_TYPE_ID_INDEX => {
                let index = self.read_size()?;
                let type_id = index
                    .checked_sub(1)
                    .and_then(|index| {
                        self.encapsulations
                            .last()
                            .and_then(|encaps| encaps.type_ids.get(index))
                    })
                    .cloned()
                    .ok_or(StreamError::InvalidTypeIdIndex(index))?;
                (type_id, None)
            }
            SLICE_FLAG_HAS_TYPE_ID_COMPACT => {
                let compact_id = self.read_size()?;
                let compact_id =
                    i32::try_from(compact_id).map_err(|_| StreamError::SizeOverflow(compact_id))?;
                let type_id = self
                    .registry
                    .and_then(|registry| registry.type_id_for_compact_id(compact_id))
                    .map(str::to_string)
                    .unwrap_or_default();
                (type_id, Some(compact_id))
            }
            _ => return Err(StreamError::Marshal("slice carries no type id".into())),
        };

        if flags & SLICE_FLAG_HAS_SLICE_SIZE == 0 {
            return Err(StreamError::MissingSliceSize);
        }
        let size_pos = self.pos;
        let size = self.read_int()?;
        if size < SLICE_SIZE_FIELD_SIZE as i32 {
            return Err(StreamError::Marshal(format!("invalid slice size {size}")));
        }
        let end = size_pos + size as usize;
        if end > self.limit() {
            return Err(StreamError::SizeExceedsRemaining {
                size: size as usize,
                remaining: self.limit() - size_pos,
            });
        }
        let data_start = self.pos;

        let (table, table_end) = if flags & SLICE_FLAG_HAS_INDIRECTION_TABLE != 0 {
            self.pos = end;
            let count = self.read_and_check_seq_size(1)?;
            let mut table = Vec::with_capacity(count);
            for _ in 0..count {
                let wire_id = self.read_size()?;
                let wire_id = match i32::try_from(wire_id) {
                    Ok(wire_id) if wire_id > 0 => wire_id,
                    _ => return Err(StreamError::InvalidInstanceId(wire_id as i32)),
                };
                let slot = self.reserve_slot(wire_id);
                self.patches.register(wire_id, no_op_patcher(), &self.graph)?;
                table.push((wire_id, slot));
            }
            let table_end = self.pos;
            self.pos = data_start;
            (table, table_end)
        } else {
            (Vec::new(), end)
        };

        if let Some(instance) = self.instance.as_mut() {
            instance.state = SliceState::InSlice;
            instance.current = Some(SliceHeader {
                type_id,
                compact_id,
                flags,
                data_start,
                end,
                table,
                table_end,
            });
        }
        Ok(())
    }

    fn skip_slice(&mut self) -> Result<SliceInfo, StreamError> {
        let instance = self
            .instance
            .as_mut()
            .ok_or(StreamError::SliceState("no instance is being read"))?;
        let header = instance
            .current
            .take()
            .ok_or(StreamError::SliceState("no slice is open"))?;
        instance.state = if header.is_last() {
            SliceState::Done
        } else {
            SliceState::AwaitingSlice
        };
        let bytes = self.buf[header.data_start..header.end].to_vec();
        self.pos = header.table_end;
        Ok(SliceInfo {
            is_last_slice: header.is_last(),
            has_optional_members: header.flags & SLICE_FLAG_HAS_OPTIONAL_MEMBERS != 0,
            instances: header.table.iter().map(|(_, slot)| *slot).collect(),
            type_id: header.type_id,
            compact_id: header.compact_id,
            bytes,
        })
    }

    fn mark_peeked(&mut self) {
        if let Some(instance) = self.instance.as_mut() {
            instance.peeked = true;
        }
    }

    fn current_header(&self) -> Result<&SliceHeader, StreamError> {
        self.current_slice()
            .ok_or(StreamError::SliceState("no slice is open"))
    }

    fn current_slice(&self) -> Option<&SliceHeader> {
        self.instance
            .as_ref()
            .filter(|instance| instance.state == SliceState::InSlice)
            .and_then(|instance| instance.current.as_ref())
    }

    fn limit(&self) -> usize {
        self.encapsulations
            .last()
            .map_or(self.buf.len(), |encaps| encaps.end)
    }

    fn optional_limit(&self) -> usize {
        self.current_slice()
            .map_or_else(|| self.limit(), |slice| slice.end)
    }
}
