use slicewire::slicing::{ClassType, SliceDescriptor, SlicedData, ValueId};
use slicewire::stream::{InputStream, OutputStream, StreamError};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Node {
    pub value: i32,
    pub next: Option<ValueId>,
}

impl ClassType for Node {
    const SLICES: &'static [SliceDescriptor<Self>] = &[SliceDescriptor {
        type_id: "::Test::Node",
        compact_id: Some(1),
        write_members: |node, os| {
            os.write_int(node.value);
            os.write_value(node.next)
        },
        read_members: |node, is| {
            node.value = is.read_int()?;
            node.next = is.read_value()?;
            Ok(())
        },
    }];
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Base {
    pub name: String,
}

impl ClassType for Base {
    const SLICES: &'static [SliceDescriptor<Self>] = &[SliceDescriptor {
        type_id: "::Test::Base",
        compact_id: None,
        write_members: |base, os| os.write_string(&base.name),
        read_members: |base, is| {
            base.name = is.read_string()?;
            Ok(())
        },
    }];
}

#[derive(Debug, Default)]
pub struct Derived {
    pub name: String,
    pub extra: i32,
    pub note: Option<String>,
    /// Slices of more-derived types this build does not know.
    pub sliced: Option<SlicedData>,
}

fn write_derived_slice(
    extra: i32,
    note: Option<&str>,
    os: &mut OutputStream,
) -> Result<(), StreamError> {
    os.write_int(extra);
    os.write_optional_value(1, note)
}

fn read_derived_slice(is: &mut InputStream<'_>) -> Result<(i32, Option<String>), StreamError> {
    let extra = is.read_int()?;
    let note = is.read_optional_value(1)?;
    Ok((extra, note))
}

impl ClassType for Derived {
    const SLICES: &'static [SliceDescriptor<Self>] = &[
        SliceDescriptor {
            type_id: "::Test::Derived",
            compact_id: None,
            write_members: |derived, os| {
                write_derived_slice(derived.extra, derived.note.as_deref(), os)
            },
            read_members: |derived, is| {
                (derived.extra, derived.note) = read_derived_slice(is)?;
                Ok(())
            },
        },
        SliceDescriptor {
            type_id: "::Test::Base",
            compact_id: None,
            write_members: |derived, os| os.write_string(&derived.name),
            read_members: |derived, is| {
                derived.name = is.read_string()?;
                Ok(())
            },
        },
    ];

    fn sliced_data_slot(&mut self) -> Option<&mut Option<SlicedData>> {
        Some(&mut self.sliced)
    }

    fn preserved_slices(&self) -> Option<&SlicedData> {
        self.sliced.as_ref()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MoreDerived {
    pub name: String,
    pub extra: i32,
    pub note: Option<String>,
    pub level: i64,
    pub link: Option<ValueId>,
}

impl ClassType for MoreDerived {
    const SLICES: &'static [SliceDescriptor<Self>] = &[
        SliceDescriptor {
            type_id: "::Test::MoreDerived",
            compact_id: None,
            write_members: |value, os| {
                os.write_long(value.level);
                os.write_value(value.link)
            },
            read_members: |value, is| {
                value.level = is.read_long()?;
                value.link = is.read_value()?;
                Ok(())
            },
        },
        SliceDescriptor {
            type_id: "::Test::Derived",
            compact_id: None,
            write_members: |value, os| write_derived_slice(value.extra, value.note.as_deref(), os),
            read_members: |value, is| {
                (value.extra, value.note) = read_derived_slice(is)?;
                Ok(())
            },
        },
        SliceDescriptor {
            type_id: "::Test::Base",
            compact_id: None,
            write_members: |value, os| os.write_string(&value.name),
            read_members: |value, is| {
                value.name = is.read_string()?;
                Ok(())
            },
        },
    ];
}
