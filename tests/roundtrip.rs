use proptest::prelude::*;
use squish::data_io::{ByteReader, ByteWriter};
use squish::learner::is_valid_order;
use squish::squid::{encode_value, TupleEncoder};
use squish::{
    attribute_order, compress_tuples, decompress_tuples, AttrType, AttrValue, ColumnConfig,
    CompressionConfig, Compressor, Decompressor, Error, Model, Schema,
};

fn compress(schema: &Schema, config: &CompressionConfig, rows: &[Vec<AttrValue>]) -> Vec<u8> {
    compress_tuples(Vec::new(), schema, config, rows).unwrap()
}

/// Bits of the tuple stream alone, without header and dictionary.
fn stream_bits(schema: &Schema, config: &CompressionConfig, rows: &[Vec<AttrValue>]) -> usize {
    let mut compressor = Compressor::new(Vec::new(), schema.clone(), config).unwrap();
    while compressor.require_more_iterations() {
        for row in rows {
            compressor.read_tuple(row).unwrap();
        }
        compressor.end_of_data().unwrap();
    }
    compressor.stream_bits()
}

fn mixed_schema() -> (Schema, CompressionConfig) {
    let schema = Schema::new(vec![
        AttrType::Enum { cap: 4 },
        AttrType::Integer,
        AttrType::Real,
        AttrType::String,
        AttrType::Integer,
    ]);
    let config = CompressionConfig::new(vec![
        ColumnConfig::default(),
        ColumnConfig::lossy(0.0).with_predictors(vec![0]),
        ColumnConfig::lossy(0.01),
        ColumnConfig::default(),
        ColumnConfig::lossy(3.0),
    ]);
    (schema, config)
}

fn mixed_row() -> impl Strategy<Value = Vec<AttrValue>> {
    (
        0u32..4,
        -1000i64..1000,
        -100.0f64..100.0,
        "[a-z ]{0,70}",
        any::<i64>(),
    )
        .prop_map(|(e, i, r, s, wide)| {
            vec![
                AttrValue::Enum(e),
                AttrValue::Integer(i),
                AttrValue::Real(r),
                AttrValue::String(s),
                AttrValue::Integer(wide),
            ]
        })
}

fn assert_within_tolerance(original: &[Vec<AttrValue>], decoded: &[Vec<AttrValue>]) {
    assert_eq!(original.len(), decoded.len());
    for (a, b) in original.iter().zip(decoded) {
        assert_eq!(a[0], b[0]);
        assert_eq!(a[1], b[1]);
        let (x, y) = (a[2].as_real().unwrap(), b[2].as_real().unwrap());
        assert!((x - y).abs() <= 0.01, "{x} decoded as {y}");
        assert_eq!(a[3], b[3]);
        let (x, y) = (a[4].as_integer().unwrap(), b[4].as_integer().unwrap());
        assert!((x as i128 - y as i128).abs() <= 3, "{x} decoded as {y}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_roundtrip_within_tolerance(rows in prop::collection::vec(mixed_row(), 1..60)) {
        let (schema, config) = mixed_schema();
        let bytes = compress(&schema, &config, &rows);
        let decoded = decompress_tuples(&bytes[..], &schema).unwrap();
        assert_within_tolerance(&rows, &decoded);
    }
}

#[test]
fn test_roundtrip_beyond_the_sample() {
    let (schema, config) = mixed_schema();
    let rows: Vec<Vec<AttrValue>> = (0..5000i64)
        .map(|i| {
            vec![
                AttrValue::Enum((i % 4) as u32),
                AttrValue::Integer((i % 4) * 100 + i % 7),
                AttrValue::Real(i as f64 * 0.37 - 900.0),
                AttrValue::String(format!("row {}", i * 7919 % 1000)),
                AttrValue::Integer(if i < 4000 { i } else { i * 1_000_000 }),
            ]
        })
        .collect();
    let bytes = compress(&schema, &config, &rows);
    let decoded = decompress_tuples(&bytes[..], &schema).unwrap();
    assert_within_tolerance(&rows, &decoded);
}

#[test]
fn test_constant_integer_beats_naive_encoding() {
    let schema = Schema::new(vec![AttrType::Enum { cap: 2 }, AttrType::Integer]);
    let config = CompressionConfig::lossless(&schema);
    let rows = vec![
        vec![AttrValue::Enum(0), AttrValue::Integer(5)],
        vec![AttrValue::Enum(1), AttrValue::Integer(5)],
        vec![AttrValue::Enum(0), AttrValue::Integer(5)],
    ];
    // One bit for the enum and one for the integer per tuple.
    let naive = rows.len() * 2;
    assert!(stream_bits(&schema, &config, &rows) < naive);

    let bytes = compress(&schema, &config, &rows);
    assert_eq!(decompress_tuples(&bytes[..], &schema).unwrap(), rows);
}

fn integer_column(values: &[i64], tolerance: f64) -> Vec<i64> {
    let schema = Schema::new(vec![AttrType::Integer]);
    let config = CompressionConfig::new(vec![ColumnConfig::lossy(tolerance)]);
    let rows: Vec<Vec<AttrValue>> = values.iter().map(|&v| vec![AttrValue::Integer(v)]).collect();
    let bytes = compress(&schema, &config, &rows);
    decompress_tuples(&bytes[..], &schema)
        .unwrap()
        .iter()
        .map(|row| row[0].as_integer().unwrap())
        .collect()
}

#[test]
fn test_integer_extremes_roundtrip_exactly() {
    let values = [0, i64::MIN, i64::MAX, i64::MIN + 1, i64::MAX - 1, -1, 1];
    assert_eq!(integer_column(&values, 0.0), values);

    let values = [i64::MIN, i64::MIN, i64::MIN, i64::MAX];
    assert_eq!(integer_column(&values, 0.0), values);
}

#[test]
fn test_integer_extremes_within_tolerance() {
    for values in [
        [-1, -1, -1, i64::MAX],
        [1, 1, 1, i64::MIN],
        [i64::MAX, i64::MAX, i64::MIN, 0],
    ] {
        let decoded = integer_column(&values, 2.0);
        assert_eq!(decoded.len(), values.len());
        for (&v, &d) in values.iter().zip(&decoded) {
            assert!((v as i128 - d as i128).abs() <= 2, "{v} decoded as {d}");
        }
    }
}

#[test]
fn test_short_strings_roundtrip() {
    let schema = Schema::new(vec![AttrType::String]);
    let config = CompressionConfig::lossless(&schema);
    let rows: Vec<Vec<AttrValue>> = ["", "a", "ab"]
        .iter()
        .map(|s| vec![AttrValue::String(s.to_string())])
        .collect();
    let bytes = compress(&schema, &config, &rows);
    assert_eq!(decompress_tuples(&bytes[..], &schema).unwrap(), rows);
}

#[test]
fn test_long_strings_roundtrip() {
    let schema = Schema::new(vec![AttrType::String]);
    let config = CompressionConfig::lossless(&schema);
    let rows: Vec<Vec<AttrValue>> = [62usize, 63, 64, 200, 1000]
        .iter()
        .map(|&n| {
            let text: String = (0..n).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
            vec![AttrValue::String(text)]
        })
        .chain(std::iter::once(vec![AttrValue::String("ünïcödé ".repeat(20))]))
        .collect();
    let bytes = compress(&schema, &config, &rows);
    assert_eq!(decompress_tuples(&bytes[..], &schema).unwrap(), rows);
}

#[test]
fn test_predictors_shrink_the_stream() {
    let schema = Schema::new(vec![AttrType::Enum { cap: 8 }, AttrType::Integer]);
    let rows: Vec<Vec<AttrValue>> = (0..400u32)
        .map(|i| {
            let group = i * 5 % 8;
            vec![
                AttrValue::Enum(group),
                AttrValue::Integer(group as i64 * 1000),
            ]
        })
        .collect();
    let plain = CompressionConfig::lossless(&schema);
    let predicted = CompressionConfig::new(vec![
        ColumnConfig::default(),
        ColumnConfig::default().with_predictors(vec![0]),
    ]);
    assert!(stream_bits(&schema, &predicted, &rows) < stream_bits(&schema, &plain, &rows));

    let bytes = compress(&schema, &predicted, &rows);
    assert_eq!(decompress_tuples(&bytes[..], &schema).unwrap(), rows);
}

#[test]
fn test_persisted_order_respects_predictors() {
    let schema = Schema::new(vec![
        AttrType::Integer,
        AttrType::Enum { cap: 3 },
        AttrType::Enum { cap: 2 },
    ]);
    let config = CompressionConfig::new(vec![
        ColumnConfig::default().with_predictors(vec![2, 1]),
        ColumnConfig::default().with_predictors(vec![2]),
        ColumnConfig::default(),
    ]);
    let rows: Vec<Vec<AttrValue>> = (0..30u32)
        .map(|i| {
            vec![
                AttrValue::Integer((i % 3 + i % 2) as i64),
                AttrValue::Enum(i % 3),
                AttrValue::Enum(i % 2),
            ]
        })
        .collect();
    let bytes = compress(&schema, &config, &rows);

    // Header: magic, version, tuple count; the dictionary starts byte aligned.
    let dictionary = &bytes[13..];
    assert_eq!(u16::from_be_bytes([dictionary[0], dictionary[1]]), 3);
    let order: Vec<usize> = dictionary[2..8]
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]) as usize)
        .collect();
    assert_eq!(order, vec![2, 1, 0]);
    assert!(is_valid_order(&order, &config.predictor_lists()));
    assert_eq!(attribute_order(&config.predictor_lists()).unwrap(), order);
    assert_eq!(decompress_tuples(&bytes[..], &schema).unwrap(), rows);
}

#[test]
fn test_cyclic_predictors_are_rejected() {
    let schema = Schema::new(vec![AttrType::Enum { cap: 2 }, AttrType::Enum { cap: 2 }]);
    let config = CompressionConfig::new(vec![
        ColumnConfig::default().with_predictors(vec![1]),
        ColumnConfig::default().with_predictors(vec![0]),
    ]);
    assert!(matches!(
        Compressor::new(Vec::new(), schema, &config),
        Err(Error::CyclicPredictors(_))
    ));
}

#[test]
fn test_model_descriptions_are_idempotent() {
    let (schema, config) = mixed_schema();
    let rows: Vec<Vec<AttrValue>> = (0..200i64)
        .map(|i| {
            vec![
                AttrValue::Enum((i % 3) as u32),
                AttrValue::Integer(i % 3 * 10 + i % 2),
                AttrValue::Real((i as f64).sqrt()),
                AttrValue::String(format!("v{}", i % 9)),
                AttrValue::Integer(i * i),
            ]
        })
        .collect();
    let bytes = compress(&schema, &config, &rows);
    let decompressor = Decompressor::new(&bytes[..], schema.clone()).unwrap();

    for (column, model) in decompressor.models().iter().enumerate() {
        let mut out = ByteWriter::new(1);
        model.write(&mut out, 0);
        let mut first = Vec::new();
        out.finish(&mut first).unwrap();

        let restored = Model::read(&mut ByteReader::new(&first[..]), &schema, column).unwrap();
        assert_eq!(&restored, model);
        let mut out = ByteWriter::new(1);
        restored.write(&mut out, 0);
        let mut second = Vec::new();
        out.finish(&mut second).unwrap();
        assert_eq!(first, second);

        for row in &rows[..20] {
            let encode = |m: &Model| {
                let mut encoder = TupleEncoder::new();
                let mut squid = m.squid(&row[..]).unwrap();
                encode_value(&mut squid, &row[column], &mut encoder).unwrap();
                encoder.finish()
            };
            assert_eq!(encode(model), encode(&restored));
        }
    }
}

fn sample_file() -> (Schema, Vec<u8>) {
    let schema = Schema::new(vec![AttrType::Enum { cap: 5 }, AttrType::String]);
    let rows: Vec<Vec<AttrValue>> = (0..50u32)
        .map(|i| {
            vec![
                AttrValue::Enum(i * 3 % 5),
                AttrValue::String(format!("name-{i}")),
            ]
        })
        .collect();
    let bytes = compress(&schema, &CompressionConfig::lossless(&schema), &rows);
    (schema, bytes)
}

#[test]
fn test_every_truncation_is_detected() {
    let (schema, bytes) = sample_file();
    for cut in 0..bytes.len() {
        assert!(
            decompress_tuples(&bytes[..cut], &schema).is_err(),
            "prefix of {cut} bytes decoded"
        );
    }
    assert!(matches!(
        decompress_tuples(&bytes[..bytes.len() - 1], &schema),
        Err(Error::Truncated)
    ));
}

#[test]
fn test_corrupt_header_is_detected() {
    let (schema, mut bytes) = sample_file();
    bytes[4] = 9;
    assert!(matches!(
        decompress_tuples(&bytes[..], &schema),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn test_corrupt_stream_never_panics() {
    let (schema, bytes) = sample_file();
    for offset in bytes.len() - 8..bytes.len() {
        for bit in 0..8 {
            let mut damaged = bytes.clone();
            damaged[offset] ^= 1 << bit;
            if let Ok(rows) = decompress_tuples(&damaged[..], &schema) {
                assert_eq!(rows.len(), 50);
            }
        }
    }
}
