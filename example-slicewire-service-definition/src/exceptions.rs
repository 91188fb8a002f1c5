use slicewire::slicing::{ExceptionType, SliceDescriptor};
use std::fmt;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BaseError {
    pub reason: String,
}

impl fmt::Display for BaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BaseError: {}", self.reason)
    }
}

impl ExceptionType for BaseError {
    const SLICES: &'static [SliceDescriptor<Self>] = &[SliceDescriptor {
        type_id: "::Test::BaseError",
        compact_id: None,
        write_members: |e, os| os.write_string(&e.reason),
        read_members: |e, is| {
            e.reason = is.read_string()?;
            Ok(())
        },
    }];
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DerivedError {
    pub reason: String,
    pub code: i32,
}

impl fmt::Display for DerivedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedError {}: {}", self.code, self.reason)
    }
}

impl ExceptionType for DerivedError {
    const SLICES: &'static [SliceDescriptor<Self>] = &[
        SliceDescriptor {
            type_id: "::Test::DerivedError",
            compact_id: None,
            write_members: |e, os| {
                os.write_int(e.code);
                Ok(())
            },
            read_members: |e, is| {
                e.code = is.read_int()?;
                Ok(())
            },
        },
        SliceDescriptor {
            type_id: "::Test::BaseError",
            compact_id: None,
            write_members: |e, os| os.write_string(&e.reason),
            read_members: |e, is| {
                e.reason = is.read_string()?;
                Ok(())
            },
        },
    ];
}

/// Not in any throws clause; servants raising it exercise the undeclared
/// exception path.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UndeclaredError {
    pub detail: String,
}

impl fmt::Display for UndeclaredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UndeclaredError: {}", self.detail)
    }
}

impl ExceptionType for UndeclaredError {
    const SLICES: &'static [SliceDescriptor<Self>] = &[SliceDescriptor {
        type_id: "::Test::UndeclaredError",
        compact_id: None,
        write_members: |e, os| os.write_string(&e.detail),
        read_members: |e, is| {
            e.detail = is.read_string()?;
            Ok(())
        },
    }];
}
