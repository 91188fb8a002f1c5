use crate::stream::OptionalFormat;

/// Shape of a type as far as the encoding is concerned.
///
/// Generated bindings describe their types with this; the codec derives the
/// optional format and the minimum wire size from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    /// Class instance reference.
    Class,
    /// Proxy (object reference) value.
    Proxy,
    Enum,
    Struct(Vec<TypeKind>),
    Sequence(Box<TypeKind>),
    Dictionary(Box<TypeKind>, Box<TypeKind>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireSize {
    Fixed(usize),
    Variable,
}

impl TypeKind {
    pub fn wire_size(&self) -> WireSize {
        match self {
            TypeKind::Bool | TypeKind::Byte => WireSize::Fixed(1),
            TypeKind::Short => WireSize::Fixed(2),
            TypeKind::Int | TypeKind::Float => WireSize::Fixed(4),
            TypeKind::Long | TypeKind::Double => WireSize::Fixed(8),
            TypeKind::Struct(members) => {
                let mut total = 0;
                for member in members {
                    match member.wire_size() {
                        WireSize::Fixed(n) => total += n,
                        WireSize::Variable => return WireSize::Variable,
                    }
                }
                WireSize::Fixed(total)
            }
            _ => WireSize::Variable,
        }
    }

    pub fn is_variable_length(&self) -> bool {
        self.wire_size() == WireSize::Variable
    }

    /// Smallest number of bytes one value of this type can occupy; used to
    /// reject sequence counts the remaining input cannot possibly hold.
    pub fn min_wire_size(&self) -> usize {
        match self {
            TypeKind::Bool | TypeKind::Byte => 1,
            TypeKind::Short => 2,
            TypeKind::Int | TypeKind::Float => 4,
            TypeKind::Long | TypeKind::Double => 8,
            // Empty name and category.
            TypeKind::Proxy => 2,
            TypeKind::String
            | TypeKind::Class
            | TypeKind::Enum
            | TypeKind::Sequence(_)
            | TypeKind::Dictionary(_, _) => 1,
            TypeKind::Struct(members) => members.iter().map(TypeKind::min_wire_size).sum(),
        }
    }

    pub fn optional_format(&self) -> OptionalFormat {
        match self {
            TypeKind::Bool | TypeKind::Byte => OptionalFormat::F1,
            TypeKind::Short => OptionalFormat::F2,
            TypeKind::Int | TypeKind::Float => OptionalFormat::F4,
            TypeKind::Long | TypeKind::Double => OptionalFormat::F8,
            TypeKind::String => OptionalFormat::VSize,
            TypeKind::Class => OptionalFormat::Class,
            TypeKind::Proxy => OptionalFormat::FSize,
            TypeKind::Enum => OptionalFormat::Size,
            TypeKind::Struct(_) => self.size_prefixed_format(),
            TypeKind::Sequence(element) => element.size_prefixed_format(),
            TypeKind::Dictionary(key, value) => {
                if key.is_variable_length() || value.is_variable_length() {
                    OptionalFormat::FSize
                } else {
                    OptionalFormat::VSize
                }
            }
        }
    }

    fn size_prefixed_format(&self) -> OptionalFormat {
        if self.is_variable_length() {
            OptionalFormat::FSize
        } else {
            OptionalFormat::VSize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_formats_follow_wire_shape() {
        assert_eq!(TypeKind::Bool.optional_format(), OptionalFormat::F1);
        assert_eq!(TypeKind::Short.optional_format(), OptionalFormat::F2);
        assert_eq!(TypeKind::Float.optional_format(), OptionalFormat::F4);
        assert_eq!(TypeKind::Double.optional_format(), OptionalFormat::F8);
        assert_eq!(TypeKind::String.optional_format(), OptionalFormat::VSize);
        assert_eq!(TypeKind::Enum.optional_format(), OptionalFormat::Size);
        assert_eq!(TypeKind::Proxy.optional_format(), OptionalFormat::FSize);
        assert_eq!(TypeKind::Class.optional_format(), OptionalFormat::Class);

        let ints = TypeKind::Sequence(Box::new(TypeKind::Int));
        let strings = TypeKind::Sequence(Box::new(TypeKind::String));
        assert_eq!(ints.optional_format(), OptionalFormat::VSize);
        assert_eq!(strings.optional_format(), OptionalFormat::FSize);

        let point = TypeKind::Struct(vec![TypeKind::Int, TypeKind::Int]);
        let named = TypeKind::Struct(vec![TypeKind::String, TypeKind::Int]);
        assert_eq!(point.optional_format(), OptionalFormat::VSize);
        assert_eq!(point.wire_size(), WireSize::Fixed(8));
        assert_eq!(named.optional_format(), OptionalFormat::FSize);

        let fixed_map = TypeKind::Dictionary(Box::new(TypeKind::Int), Box::new(TypeKind::Long));
        let string_map =
            TypeKind::Dictionary(Box::new(TypeKind::String), Box::new(TypeKind::Long));
        assert_eq!(fixed_map.optional_format(), OptionalFormat::VSize);
        assert_eq!(string_map.optional_format(), OptionalFormat::FSize);
    }

    #[test]
    fn min_wire_size_sums_struct_members() {
        let named = TypeKind::Struct(vec![TypeKind::String, TypeKind::Long]);
        assert_eq!(named.min_wire_size(), 9);
        assert_eq!(TypeKind::Proxy.min_wire_size(), 2);
    }
}
