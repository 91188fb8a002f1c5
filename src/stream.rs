mod encoding_version;
mod identity;
mod input_stream;
mod optional_format;
mod output_stream;
mod proxy_ref;
mod stream_config;
mod stream_error;
mod type_kind;
mod wire_type;

pub use encoding_version::EncodingVersion;
pub use identity::{Context, Identity};
pub use input_stream::InputStream;
pub use optional_format::OptionalFormat;
pub use output_stream::OutputStream;
pub use proxy_ref::ProxyRef;
pub use stream_config::StreamConfig;
pub use stream_error::StreamError;
pub use type_kind::{TypeKind, WireSize};
pub use wire_type::{StreamRead, StreamWrite, WireType, encoded_size_len};
