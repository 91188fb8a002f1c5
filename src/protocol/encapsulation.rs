use crate::constants::ENCAPSULATION_HEADER_SIZE;
use crate::slicing::TypeRegistry;
use crate::stream::{
    EncodingVersion, InputStream, OptionalFormat, OutputStream, StreamConfig, StreamError,
    StreamRead, StreamWrite, TypeKind, WireType,
};

/// A self-delimited, versioned block of encoded data: operation parameters,
/// results, or a user exception.
///
/// The bytes include the 6-byte header, so an encapsulation can be copied
/// into a message verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encapsulation {
    bytes: Vec<u8>,
}

impl Default for Encapsulation {
    fn default() -> Self {
        Self::empty()
    }
}

impl Encapsulation {
    pub fn empty() -> Self {
        let mut os = OutputStream::with_capacity(ENCAPSULATION_HEADER_SIZE);
        os.write_empty_encapsulation();
        Self {
            bytes: os.finished(),
        }
    }

    /// Runs `write` inside a fresh encapsulation.
    pub fn build<F>(write: F) -> Result<Self, StreamError>
    where
        F: FnOnce(&mut OutputStream) -> Result<(), StreamError>,
    {
        let mut os = OutputStream::new();
        os.start_encapsulation();
        write(&mut os)?;
        os.end_encapsulation()?;
        Ok(Self {
            bytes: os.finished(),
        })
    }

    /// Wraps already-encoded bytes after checking the header.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, StreamError> {
        let mut is = InputStream::new(&bytes);
        let raw = is.read_encapsulation_raw()?;
        if raw.len() != bytes.len() {
            return Err(StreamError::InvalidEncapsulationSize(raw.len() as i32));
        }
        Ok(Self { bytes })
    }

    pub fn encoding(&self) -> EncodingVersion {
        EncodingVersion::new(self.bytes[4], self.bytes[5])
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[ENCAPSULATION_HEADER_SIZE..]
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// A stream positioned on the encapsulation header; callers open it with
    /// [`InputStream::start_encapsulation`].
    pub fn reader<'a>(&'a self, registry: Option<&'a TypeRegistry>) -> InputStream<'a> {
        match registry {
            Some(registry) => InputStream::with_registry(&self.bytes, registry),
            None => InputStream::new(&self.bytes),
        }
    }

    /// Opens the encapsulation, runs `read`, and closes it again.
    pub fn decode<T, F>(
        &self,
        registry: Option<&TypeRegistry>,
        config: StreamConfig,
        read: F,
    ) -> Result<T, StreamError>
    where
        F: FnOnce(&mut InputStream<'_>) -> Result<T, StreamError>,
    {
        let mut is = self.reader(registry).with_config(config);
        is.start_encapsulation()?;
        let value = read(&mut is)?;
        is.end_encapsulation()?;
        Ok(value)
    }
}

impl WireType for Encapsulation {
    const OPTIONAL_FORMAT: OptionalFormat = OptionalFormat::FSize;
    const MIN_WIRE_SIZE: usize = ENCAPSULATION_HEADER_SIZE;

    fn type_kind() -> TypeKind {
        TypeKind::Sequence(Box::new(TypeKind::Byte))
    }
}

impl StreamWrite for Encapsulation {
    fn write_to(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_raw(&self.bytes);
        Ok(())
    }
}

impl StreamRead for Encapsulation {
    fn read_from(is: &mut InputStream<'_>) -> Result<Self, StreamError> {
        let bytes = is.read_encapsulation_raw()?.to_vec();
        Ok(Self { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_encapsulation_is_just_a_header() {
        let empty = Encapsulation::empty();
        assert_eq!(empty.as_bytes(), &[6, 0, 0, 0, 1, 1]);
        assert!(empty.is_empty());
        assert_eq!(empty.encoding(), EncodingVersion::CURRENT);
    }

    #[test]
    fn build_backpatches_the_size() {
        let encaps = Encapsulation::build(|os| {
            os.write_int(42);
            os.write_string("hi")
        })
        .unwrap();
        assert_eq!(encaps.as_bytes()[..4], 13i32.to_le_bytes());
        let (number, text) = encaps
            .decode(None, StreamConfig::default(), |is| {
                Ok((is.read_int()?, is.read_string()?))
            })
            .unwrap();
        assert_eq!(number, 42);
        assert_eq!(text, "hi");
    }

    #[test]
    fn from_bytes_rejects_truncated_input() {
        assert!(Encapsulation::from_bytes(vec![12, 0, 0, 0, 1, 1, 0]).is_err());
        assert!(Encapsulation::from_bytes(vec![6, 0, 0, 0, 2, 0]).is_err());
    }

    #[test]
    fn unread_instance_section_fails_the_decode() {
        let encaps = Encapsulation::build(|os| {
            os.write_int(1);
            // An (empty) class instance section the reader never asks for.
            os.write_raw(&[0xFF, 0]);
            Ok(())
        })
        .unwrap();
        let result = encaps.decode(None, StreamConfig::default(), |is| is.read_int());
        assert!(matches!(result, Err(StreamError::EncapsulationState(_))));
    }
}
