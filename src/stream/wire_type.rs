use crate::constants::MAX_SHORT_SIZE;
use crate::stream::{InputStream, OptionalFormat, OutputStream, StreamError, TypeKind};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Static encoding facts about a type.
pub trait WireType {
    /// Format used when a value of this type travels as an optional member.
    const OPTIONAL_FORMAT: OptionalFormat;

    /// Smallest possible encoding, used to sanity-check sequence counts.
    const MIN_WIRE_SIZE: usize;

    /// Exact encoded width for fixed-size types.
    const FIXED_WIRE_SIZE: Option<usize> = None;

    /// Whether a `VSize` optional of this type is preceded by an explicit
    /// byte count. Strings are self-delimiting and are not.
    const VSIZE_PREFIXED: bool = Self::FIXED_WIRE_SIZE.is_some();

    fn type_kind() -> TypeKind;
}

pub trait StreamWrite: WireType {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError>;

    /// Byte count written ahead of a size-prefixed `VSize` optional.
    fn vsize_payload_len(&self) -> Option<usize> {
        Self::FIXED_WIRE_SIZE
    }
}

pub trait StreamRead: WireType + Sized {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError>;
}

/// Number of bytes the compact size encoding uses for `size`.
pub fn encoded_size_len(size: usize) -> usize {
    if size <= MAX_SHORT_SIZE { 1 } else { 5 }
}

macro_rules! impl_fixed_primitive {
    ($ty:ty, $width:expr, $format:expr, $kind:expr) => {
        impl WireType for $ty {
            const OPTIONAL_FORMAT: OptionalFormat = $format;
            const MIN_WIRE_SIZE: usize = $width;
            const FIXED_WIRE_SIZE: Option<usize> = Some($width);

            fn type_kind() -> TypeKind {
                $kind
            }
        }

        impl StreamWrite for $ty {
            fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
                os.write_raw(&self.to_le_bytes());
                Ok(())
            }
        }

        impl StreamRead for $ty {
            fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
                is.read_array::<$width>().map(<$ty>::from_le_bytes)
            }
        }
    };
}

impl_fixed_primitive!(u8, 1, OptionalFormat::F1, TypeKind::Byte);
impl_fixed_primitive!(i16, 2, OptionalFormat::F2, TypeKind::Short);
impl_fixed_primitive!(i32, 4, OptionalFormat::F4, TypeKind::Int);
impl_fixed_primitive!(i64, 8, OptionalFormat::F8, TypeKind::Long);
impl_fixed_primitive!(f32, 4, OptionalFormat::F4, TypeKind::Float);
impl_fixed_primitive!(f64, 8, OptionalFormat::F8, TypeKind::Double);

impl WireType for bool {
    const OPTIONAL_FORMAT: OptionalFormat = OptionalFormat::F1;
    const MIN_WIRE_SIZE: usize = 1;
    const FIXED_WIRE_SIZE: Option<usize> = Some(1);

    fn type_kind() -> TypeKind {
        TypeKind::Bool
    }
}

impl StreamWrite for bool {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_bool(*self);
        Ok(())
    }
}

impl StreamRead for bool {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        is.read_bool()
    }
}

impl WireType for str {
    const OPTIONAL_FORMAT: OptionalFormat = OptionalFormat::VSize;
    const MIN_WIRE_SIZE: usize = 1;

    fn type_kind() -> TypeKind {
        TypeKind::String
    }
}

impl StreamWrite for str {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_string(self)
    }
}

impl WireType for String {
    const OPTIONAL_FORMAT: OptionalFormat = OptionalFormat::VSize;
    const MIN_WIRE_SIZE: usize = 1;

    fn type_kind() -> TypeKind {
        TypeKind::String
    }
}

impl StreamWrite for String {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_string(self)
    }
}

impl StreamRead for String {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        is.read_string()
    }
}

const fn sequence_format(element_fixed: Option<usize>) -> OptionalFormat {
    if element_fixed.is_some() {
        OptionalFormat::VSize
    } else {
        OptionalFormat::FSize
    }
}

const fn dictionary_format(key_fixed: Option<usize>, value_fixed: Option<usize>) -> OptionalFormat {
    if key_fixed.is_some() && value_fixed.is_some() {
        OptionalFormat::VSize
    } else {
        OptionalFormat::FSize
    }
}

impl<T: WireType> WireType for [T] {
    const OPTIONAL_FORMAT: OptionalFormat = sequence_format(T::FIXED_WIRE_SIZE);
    const MIN_WIRE_SIZE: usize = 1;
    const VSIZE_PREFIXED: bool = true;

    fn type_kind() -> TypeKind {
        TypeKind::Sequence(Box::new(T::type_kind()))
    }
}

impl<T: StreamWrite> StreamWrite for [T] {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_size(self.len())?;
        for element in self {
            element.write_to(os)?;
        }
        Ok(())
    }

    fn vsize_payload_len(&self) -> Option<usize> {
        T::FIXED_WIRE_SIZE.map(|width| encoded_size_len(self.len()) + self.len() * width)
    }
}

impl<T: WireType> WireType for Vec<T> {
    const OPTIONAL_FORMAT: OptionalFormat = sequence_format(T::FIXED_WIRE_SIZE);
    const MIN_WIRE_SIZE: usize = 1;
    const VSIZE_PREFIXED: bool = true;

    fn type_kind() -> TypeKind {
        TypeKind::Sequence(Box::new(T::type_kind()))
    }
}

impl<T: StreamWrite> StreamWrite for Vec<T> {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        self.as_slice().write_to(os)
    }

    fn vsize_payload_len(&self) -> Option<usize> {
        self.as_slice().vsize_payload_len()
    }
}

impl<T: StreamRead> StreamRead for Vec<T> {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        let count = is.read_and_check_seq_size(T::MIN_WIRE_SIZE)?;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(T::read_from(is)?);
        }
        Ok(elements)
    }
}

fn write_entries<'a, K, V>(
    os: &mut OutputStream,
    len: usize,
    entries: impl Iterator<Item = (&'a K, &'a V)>,
) -> Result<(), StreamError>
where
    K: StreamWrite + 'a,
    V: StreamWrite + 'a,
{
    os.write_size(len)?;
    for (key, value) in entries {
        key.write_to(os)?;
        value.write_to(os)?;
    }
    Ok(())
}

fn dictionary_payload_len<K: WireType, V: WireType>(len: usize) -> Option<usize> {
    match (K::FIXED_WIRE_SIZE, V::FIXED_WIRE_SIZE) {
        (Some(key), Some(value)) => Some(encoded_size_len(len) + len * (key + value)),
        _ => None,
    }
}

impl<K: WireType, V: WireType> WireType for BTreeMap<K, V> {
    const OPTIONAL_FORMAT: OptionalFormat =
        dictionary_format(K::FIXED_WIRE_SIZE, V::FIXED_WIRE_SIZE);
    const MIN_WIRE_SIZE: usize = 1;
    const VSIZE_PREFIXED: bool = true;

    fn type_kind() -> TypeKind {
        TypeKind::Dictionary(Box::new(K::type_kind()), Box::new(V::type_kind()))
    }
}

impl<K: StreamWrite, V: StreamWrite> StreamWrite for BTreeMap<K, V> {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        write_entries(os, self.len(), self.iter())
    }

    fn vsize_payload_len(&self) -> Option<usize> {
        dictionary_payload_len::<K, V>(self.len())
    }
}

impl<K: StreamRead + Ord, V: StreamRead> StreamRead for BTreeMap<K, V> {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        let count = is.read_and_check_seq_size(K::MIN_WIRE_SIZE + V::MIN_WIRE_SIZE)?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::read_from(is)?;
            let value = V::read_from(is)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K: WireType, V: WireType> WireType for HashMap<K, V> {
    const OPTIONAL_FORMAT: OptionalFormat =
        dictionary_format(K::FIXED_WIRE_SIZE, V::FIXED_WIRE_SIZE);
    const MIN_WIRE_SIZE: usize = 1;
    const VSIZE_PREFIXED: bool = true;

    fn type_kind() -> TypeKind {
        TypeKind::Dictionary(Box::new(K::type_kind()), Box::new(V::type_kind()))
    }
}

impl<K: StreamWrite, V: StreamWrite> StreamWrite for HashMap<K, V> {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        write_entries(os, self.len(), self.iter())
    }

    fn vsize_payload_len(&self) -> Option<usize> {
        dictionary_payload_len::<K, V>(self.len())
    }
}

impl<K: StreamRead + Eq + Hash, V: StreamRead> StreamRead for HashMap<K, V> {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        let count = is.read_and_check_seq_size(K::MIN_WIRE_SIZE + V::MIN_WIRE_SIZE)?;
        let mut map = HashMap::with_capacity(count);
        for _ in 0..count {
            let key = K::read_from(is)?;
            let value = V::read_from(is)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}
