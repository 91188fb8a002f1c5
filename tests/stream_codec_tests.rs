use slicewire::protocol::Encapsulation;
use slicewire::stream::{InputStream, OptionalFormat, OutputStream, StreamConfig, StreamError};
use std::collections::{BTreeMap, HashMap};

#[test]
fn size_switches_to_escape_after_254() {
    let mut os = OutputStream::new();
    os.write_size(254).expect("short size");
    os.write_size(255).expect("long size");
    os.write_size(0).expect("zero size");
    assert_eq!(os.as_bytes(), &[254, 255, 255, 0, 0, 0, 0]);

    let bytes = os.finished();
    let mut is = InputStream::new(&bytes);
    assert_eq!(is.read_size().unwrap(), 254);
    assert_eq!(is.read_size().unwrap(), 255);
    assert_eq!(is.read_size().unwrap(), 0);
    assert!(is.is_at_end());
}

#[test]
fn strings_are_length_prefixed_utf8() {
    let long = "x".repeat(300);
    let mut os = OutputStream::new();
    os.write_string("héllo").unwrap();
    os.write_string("").unwrap();
    os.write_string(&long).unwrap();
    let bytes = os.finished();

    assert_eq!(bytes[0], 6);
    assert_eq!(&bytes[1..7], "héllo".as_bytes());
    assert_eq!(bytes[7], 0);
    assert_eq!(bytes[8], 255);

    let mut is = InputStream::new(&bytes);
    assert_eq!(is.read_string().unwrap(), "héllo");
    assert_eq!(is.read_string().unwrap(), "");
    assert_eq!(is.read_string().unwrap(), long);
}

#[test]
fn invalid_utf8_is_rejected() {
    let bytes = [2, 0xC3, 0x28];
    let mut is = InputStream::new(&bytes);
    assert_eq!(is.read_string(), Err(StreamError::InvalidUtf8));
}

#[test]
fn nested_collections_decode_to_the_written_values() {
    let nested: Vec<Vec<i32>> = vec![vec![], vec![1], (0..300).collect()];
    let names: BTreeMap<String, i32> = [("a".to_string(), 1), ("b".to_string(), -2)].into();
    let lookup: HashMap<i16, Vec<String>> =
        [(7, vec!["seven".to_string()]), (8, Vec::new())].into();

    let mut os = OutputStream::new();
    os.write(&nested).unwrap();
    os.write(&names).unwrap();
    os.write(&lookup).unwrap();
    os.write(&vec![true, false]).unwrap();
    os.write(&vec![1.5f64, -0.25]).unwrap();
    let bytes = os.finished();

    let mut is = InputStream::new(&bytes);
    assert_eq!(is.read::<Vec<Vec<i32>>>().unwrap(), nested);
    assert_eq!(is.read::<BTreeMap<String, i32>>().unwrap(), names);
    assert_eq!(is.read::<HashMap<i16, Vec<String>>>().unwrap(), lookup);
    assert_eq!(is.read::<Vec<bool>>().unwrap(), vec![true, false]);
    assert_eq!(is.read::<Vec<f64>>().unwrap(), vec![1.5, -0.25]);
    assert!(is.is_at_end());
}

#[test]
fn truncated_input_is_a_decode_fault() {
    let mut os = OutputStream::new();
    os.write(&vec![1i64, 2, 3]).unwrap();
    let bytes = os.finished();

    let mut is = InputStream::new(&bytes[..bytes.len() - 1]);
    assert!(matches!(
        is.read::<Vec<i64>>(),
        Err(StreamError::SizeExceedsRemaining { .. })
    ));

    let mut is = InputStream::new(&[1, 2]);
    assert!(matches!(
        is.read_int(),
        Err(StreamError::UnexpectedEnd { needed: 4, .. })
    ));
}

#[test]
fn sequence_count_larger_than_input_is_rejected_early() {
    // Claims a million strings with two bytes of input.
    let mut os = OutputStream::new();
    os.write_size(1_000_000).unwrap();
    os.write_raw(&[0, 0]);
    let bytes = os.finished();
    let mut is = InputStream::new(&bytes);
    assert!(matches!(
        is.read::<Vec<String>>(),
        Err(StreamError::SizeExceedsRemaining { .. })
    ));
}

#[test]
fn negative_long_size_is_rejected() {
    let bytes = [255, 0xFF, 0xFF, 0xFF, 0xFF];
    let mut is = InputStream::new(&bytes);
    assert_eq!(is.read_size(), Err(StreamError::NegativeSize(-1)));
}

#[test]
fn enums_are_range_checked() {
    let mut os = OutputStream::new();
    assert_eq!(
        os.write_enum(4, 3),
        Err(StreamError::EnumOutOfRange { value: 4, max: 3 })
    );
    os.write_enum(2, 3).unwrap();
    let bytes = os.finished();
    assert_eq!(bytes, vec![2]);
    assert_eq!(
        InputStream::new(&bytes).read_enum(1),
        Err(StreamError::EnumOutOfRange { value: 2, max: 1 })
    );
}

#[test]
fn optional_headers_pack_tag_and_format() {
    let encaps = Encapsulation::build(|os| {
        os.write_optional_value(1, Some(&7i32))?;
        os.write_optional_value(31, Some(&9i32))
    })
    .unwrap();
    assert_eq!(
        encaps.payload(),
        &[(1 << 3) | 2, 7, 0, 0, 0, (30 << 3) | 2, 31, 9, 0, 0, 0]
    );

    let (low, high) = encaps
        .decode(None, StreamConfig::default(), |is| {
            Ok((
                is.read_optional_value::<i32>(1)?,
                is.read_optional_value::<i32>(31)?,
            ))
        })
        .unwrap();
    assert_eq!(low, Some(7));
    assert_eq!(high, Some(9));
}

#[test]
fn optional_tags_must_ascend() {
    let result = Encapsulation::build(|os| {
        os.write_optional_value(2, Some(&1u8))?;
        os.write_optional_value(1, Some(&1u8))
    });
    assert_eq!(
        result,
        Err(StreamError::OptionalTagOrder {
            tag: 1,
            previous: 2
        })
    );
}

#[test]
fn absent_optionals_write_nothing() {
    let encaps = Encapsulation::build(|os| {
        os.write_int(5);
        os.write_optional_value::<str>(1, None)
    })
    .unwrap();
    assert_eq!(encaps.payload(), &[5, 0, 0, 0]);
}

#[test]
fn optional_header_reports_whether_it_was_written() {
    let mut os = OutputStream::new();
    assert_eq!(os.write_optional(1, OptionalFormat::F4), Ok(false));
    os.write_optional_value(2, Some(&7i32)).unwrap();
    assert!(os.is_empty());

    os.start_encapsulation();
    assert_eq!(os.write_optional(3, OptionalFormat::F4), Ok(true));
    os.write_int(9);
    os.end_encapsulation().unwrap();
    let bytes = os.finished();
    assert_eq!(&bytes[6..], &[(3 << 3) | 2, 9, 0, 0, 0]);
}

#[test]
fn reader_skips_unknown_optionals_of_every_format() {
    let strings = vec!["a".to_string(), "bc".to_string()];
    let encaps = Encapsulation::build(|os| {
        os.write_int(5);
        os.write_optional_value(1, Some(&3u8))?;
        os.write_optional_value(2, Some(&-1i16))?;
        os.write_optional_value(3, Some(&2.5f64))?;
        os.write_optional_enum(4, Some(2), 5)?;
        os.write_optional_value(5, Some("text"))?;
        os.write_optional_value(6, Some(&vec![1i32, 2, 3]))?;
        os.write_optional_value(7, Some(&strings))?;
        os.write_optional_value(8, Some(&42i64))
    })
    .unwrap();

    // An older reader only knows the required int and tag 8.
    let (x, late) = encaps
        .decode(None, StreamConfig::default(), |is| {
            Ok((is.read_int()?, is.read_optional_value::<i64>(8)?))
        })
        .unwrap();
    assert_eq!(x, 5);
    assert_eq!(late, Some(42));

    // A reader that stops early leaves the rest for end_encapsulation.
    let (seq, text) = encaps
        .decode(None, StreamConfig::default(), |is| {
            is.read_int()?;
            let text = is.read_optional_value::<String>(5)?;
            Ok((is.read_optional_value::<Vec<i32>>(6)?, text))
        })
        .unwrap();
    assert_eq!(seq, Some(vec![1, 2, 3]));
    assert_eq!(text.as_deref(), Some("text"));
}

#[test]
fn missing_tag_between_present_tags_reads_as_absent() {
    let encaps = Encapsulation::build(|os| {
        os.write_optional_value(1, Some("one"))?;
        os.write_optional_value(3, Some("three"))
    })
    .unwrap();
    let values = encaps
        .decode(None, StreamConfig::default(), |is| {
            Ok((
                is.read_optional_value::<String>(2)?,
                is.read_optional_value::<String>(3)?,
            ))
        })
        .unwrap();
    assert_eq!(values, (None, Some("three".to_string())));
}

#[test]
fn optional_format_mismatch_is_an_error() {
    let encaps = Encapsulation::build(|os| os.write_optional_value(1, Some(&1i32))).unwrap();
    let result = encaps.decode(None, StreamConfig::default(), |is| {
        is.read_optional_value::<i64>(1)
    });
    assert_eq!(
        result,
        Err(StreamError::OptionalFormatMismatch {
            tag: 1,
            expected: OptionalFormat::F8,
            found: OptionalFormat::F4,
        })
    );
}

#[test]
fn unsupported_encapsulation_encoding_is_rejected() {
    let bytes = [6, 0, 0, 0, 1, 0];
    let mut is = InputStream::new(&bytes);
    assert_eq!(
        is.start_encapsulation(),
        Err(StreamError::UnsupportedEncoding { major: 1, minor: 0 })
    );
}

#[test]
fn nested_encapsulations_are_bounded_by_their_size() {
    let inner = Encapsulation::build(|os| os.write_string("inner")).unwrap();
    let outer = Encapsulation::build(|os| {
        os.write(&inner)?;
        os.write_int(9);
        Ok(())
    })
    .unwrap();

    let (decoded_inner, trailing) = outer
        .decode(None, StreamConfig::default(), |is| {
            Ok((is.read::<Encapsulation>()?, is.read_int()?))
        })
        .unwrap();
    assert_eq!(decoded_inner, inner);
    assert_eq!(trailing, 9);
}
