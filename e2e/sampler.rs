//! E2E: the sampler over real files. Filtering, lookbehind/lookahead
//! projection, bulk drain, disassembly, and the compile-time error
//! taxonomy.

use tempfile::TempDir;

use bcsv::{Column, ColumnType, Layout, Reader, Sampler, Writer};

struct SensorRow {
    ts: f64,
    temp: f32,
    status: &'static str,
    flags: u16,
    counter: i32,
}

const SENSOR_DATA: &[SensorRow] = &[
    SensorRow { ts: 1.0, temp: 20.5, status: "ok", flags: 0x06, counter: 0 },
    SensorRow { ts: 2.0, temp: 21.0, status: "ok", flags: 0x07, counter: 1 },
    SensorRow { ts: 3.0, temp: 21.0, status: "warn", flags: 0x03, counter: 2 },
    SensorRow { ts: 4.0, temp: 55.0, status: "alarm", flags: 0x05, counter: 3 },
    SensorRow { ts: 5.0, temp: 55.0, status: "alarm", flags: 0x05, counter: 100 },
    SensorRow { ts: 6.0, temp: 22.0, status: "ok", flags: 0x07, counter: 101 },
    SensorRow { ts: 7.0, temp: 22.5, status: "ok", flags: 0x06, counter: 102 },
];

fn write_sensor_file(dir: &TempDir) -> std::path::PathBuf {
    let layout = Layout::from_columns([
        Column::new("timestamp", ColumnType::Double),
        Column::new("temperature", ColumnType::Float),
        Column::new("status", ColumnType::String),
        Column::new("flags", ColumnType::UInt16),
        Column::new("counter", ColumnType::Int32),
    ])
    .unwrap();

    let path = dir.path().join("sensor.bcsv");
    let mut writer = Writer::new(layout);
    writer.open(&path, true).unwrap();
    for r in SENSOR_DATA {
        writer.row().set(0, r.ts).unwrap();
        writer.row().set(1, r.temp).unwrap();
        writer.row().set(2, r.status.to_string()).unwrap();
        writer.row().set(3, r.flags).unwrap();
        writer.row().set(4, r.counter).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();
    path
}

fn open_sampler(path: &std::path::Path) -> Sampler<Reader> {
    let mut reader = Reader::new();
    reader.open(path).unwrap();
    Sampler::new(reader)
}

#[test]
fn filter_by_threshold() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(sampler.set_conditional("X[0][\"temperature\"] > 50.0").success);
    assert!(
        sampler
            .set_selection("X[0][\"timestamp\"], X[0][\"temperature\"], X[0][\"status\"]")
            .success
    );

    let mut hits = Vec::new();
    while sampler.next().unwrap() {
        hits.push((
            sampler.row().get::<f64>(0).unwrap(),
            sampler.row().get::<f64>(1).unwrap(),
            sampler.row().get_str(2).unwrap().to_string(),
        ));
    }
    assert_eq!(
        hits,
        vec![(4.0, 55.0, "alarm".to_string()), (5.0, 55.0, "alarm".to_string())]
    );
}

/// Gradient via one-row lookbehind: 7 input rows produce 6 outputs, row 0
/// skipped because its window is incomplete.
#[test]
fn gradient_with_lookbehind() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(sampler.set_conditional("true").success);
    assert!(
        sampler
            .set_selection("X[0][0], X[0][1], (X[0][1] - X[-1][1]) / (X[0][0] - X[-1][0])")
            .success
    );

    let rows = sampler.bulk().unwrap();
    assert_eq!(rows.len(), 6);

    for (k, row) in rows.iter().enumerate() {
        let i = k + 1; // first input row is skipped
        let want_ts = SENSOR_DATA[i].ts;
        let want_grad = f64::from(SENSOR_DATA[i].temp - SENSOR_DATA[i - 1].temp)
            / (SENSOR_DATA[i].ts - SENSOR_DATA[i - 1].ts);
        assert_eq!(row.get::<f64>(0).unwrap(), want_ts);
        assert!(
            (row.get::<f64>(2).unwrap() - want_grad).abs() < 1e-9,
            "gradient at output {k}"
        );
    }

    // output layout inferred from the selection: named for plain cell
    // references, synthesized otherwise, all three doubles here
    let out = sampler.output_layout();
    assert_eq!(out.column_count(), 3);
    assert_eq!(out.name(0), "timestamp");
    assert_eq!(out.name(1), "temperature");
    assert_eq!(out.name(2), "expr2");
    assert_eq!(out.column_type(2), ColumnType::Double);
}

#[test]
fn edge_detection_with_string_and_lookbehind() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(sampler.set_conditional("X[0][2] != X[-1][2]").success);
    assert!(sampler.set_selection("X[0][0], X[0][2]").success);

    let mut edges = Vec::new();
    while sampler.next().unwrap() {
        edges.push((
            sampler.row().get::<f64>(0).unwrap(),
            sampler.row().get_str(1).unwrap().to_string(),
        ));
    }
    // status transitions happen at ts 3, 4, and 6
    assert_eq!(
        edges,
        vec![
            (3.0, "warn".to_string()),
            (4.0, "alarm".to_string()),
            (6.0, "ok".to_string()),
        ]
    );
}

/// Three-point moving average: both lookbehind and lookahead, so the
/// first and last inputs are truncated away.
#[test]
fn moving_average_with_lookahead() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(sampler.set_conditional("true").success);
    assert!(
        sampler
            .set_selection("X[0][0], (X[-1][1] + X[0][1] + X[+1][1]) / 3.0")
            .success
    );

    let rows = sampler.bulk().unwrap();
    assert_eq!(rows.len(), 5);
    for (k, row) in rows.iter().enumerate() {
        let i = k + 1;
        let want = f64::from(SENSOR_DATA[i - 1].temp + SENSOR_DATA[i].temp
            + SENSOR_DATA[i + 1].temp)
            / 3.0;
        assert_eq!(row.get::<f64>(0).unwrap(), SENSOR_DATA[i].ts);
        assert!((row.get::<f64>(1).unwrap() - want).abs() < 1e-6);
    }
}

#[test]
fn bitwise_flag_filter_and_bulk() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(sampler.set_conditional("(X[0][3] & 0x04) != 0").success);
    assert!(sampler.set_selection("X[0][0], X[0][3]").success);

    let rows = sampler.bulk().unwrap();
    let hits: Vec<f64> = rows.iter().map(|r| r.get::<f64>(0).unwrap()).collect();
    // flags with bit 2 set: 0x06, 0x07, 0x05, 0x05, 0x07, 0x06
    assert_eq!(hits, vec![1.0, 2.0, 4.0, 5.0, 6.0, 7.0]);
    // inferred integer output widens to INT64
    assert_eq!(sampler.output_layout().column_type(1), ColumnType::Int64);
    assert_eq!(rows[0].get::<i64>(1).unwrap(), 0x06);
}

#[test]
fn string_equality_filter() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(sampler.set_conditional("X[0][\"status\"] == 'alarm'").success);

    let mut count = 0;
    while sampler.next().unwrap() {
        assert_eq!(sampler.row().get_str(2).unwrap(), "alarm");
        count += 1;
    }
    assert_eq!(count, 2);
}

#[test]
fn identity_projection_by_default() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    let mut count = 0usize;
    while sampler.next().unwrap() {
        assert_eq!(sampler.row().get::<f64>(0).unwrap(), SENSOR_DATA[count].ts);
        assert_eq!(
            sampler.row().get_str(2).unwrap(),
            SENSOR_DATA[count].status
        );
        count += 1;
    }
    assert_eq!(count, SENSOR_DATA.len());
}

#[test]
fn boolean_connectives_short_circuit() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(
        sampler
            .set_conditional(
                "X[0][\"temperature\"] > 50.0 || (X[0][\"counter\"] >= 100 && X[0][2] == 'ok')"
            )
            .success
    );
    let rows = sampler.bulk().unwrap();
    let hits: Vec<f64> = rows.iter().map(|r| r.get::<f64>(0).unwrap()).collect();
    assert_eq!(hits, vec![4.0, 5.0, 6.0, 7.0]);
}

// ── Compile-time error taxonomy ─────────────────────────────────────

#[test]
fn string_arithmetic_is_a_type_error() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    let result = sampler.set_conditional("X[0][2] + 1 > 0");
    assert!(!result.success);
    assert!(
        result.error_msg.contains("'+'"),
        "message must name the operator: {}",
        result.error_msg
    );
}

#[test]
fn unknown_column_is_reported_by_name() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    let result = sampler.set_conditional("X[0][\"pressure\"] > 0");
    assert!(!result.success);
    assert!(
        result.error_msg.contains("pressure"),
        "message must name the column: {}",
        result.error_msg
    );
}

#[test]
fn out_of_range_column_index_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    let result = sampler.set_conditional("X[0][99] > 0");
    assert!(!result.success);
    assert!(result.error_msg.contains("99"), "{}", result.error_msg);
}

#[test]
fn constant_division_by_zero_fails_at_compile_time() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    let result = sampler.set_conditional("1 / 0 == 1");
    assert!(!result.success);
    assert!(
        result.error_msg.contains("zero"),
        "{}",
        result.error_msg
    );

    let result = sampler.set_conditional("X[0][\"counter\"] % (3 - 3) == 0");
    assert!(!result.success);
}

#[test]
fn string_ordering_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    let result = sampler.set_conditional("X[0][2] < 'zzz'");
    assert!(!result.success);
}

#[test]
fn non_boolean_conditional_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    let result = sampler.set_conditional("X[0][0] + 1.0");
    assert!(!result.success);
    assert!(result.error_msg.contains("BOOL"), "{}", result.error_msg);
}

#[test]
fn mixed_string_number_comparison_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    let result = sampler.set_conditional("X[0][2] == 1");
    assert!(!result.success);
}

#[test]
fn failed_compile_keeps_previous_program() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(sampler.set_conditional("X[0][1] > 50.0").success);
    assert!(!sampler.set_conditional("X[0][2] + 1 > 0").success);

    // the earlier filter still applies
    let rows = sampler.bulk().unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn disassembly_lists_opcodes() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(sampler.set_conditional("X[0][1] > 50.0").success);
    assert!(sampler.set_selection("X[0][0], X[0][1]").success);

    let listing = sampler.disassemble();
    assert!(listing.contains("; conditional"), "{listing}");
    assert!(listing.contains("; selection"), "{listing}");
    assert!(listing.contains("LOAD_CELL"), "{listing}");
    assert!(listing.contains("LOAD_CONST"), "{listing}");
    assert!(listing.contains("GT_FLOAT"), "{listing}");
    assert!(listing.contains("STORE_OUTPUT"), "{listing}");
}

/// Hex literals, unary operators, and shifts all evaluate.
#[test]
fn operator_coverage() {
    let dir = TempDir::new().unwrap();
    let path = write_sensor_file(&dir);

    let mut sampler = open_sampler(&path);
    assert!(
        sampler
            .set_conditional("((X[0][3] << 1) >> 1) == (X[0][3] & 0xFF) && !(X[0][1] < -1000.0)")
            .success
    );
    let rows = sampler.bulk().unwrap();
    assert_eq!(rows.len(), SENSOR_DATA.len());

    assert!(sampler2_negation_works(&path));
}

fn sampler2_negation_works(path: &std::path::Path) -> bool {
    let mut sampler = open_sampler(path);
    if !sampler.set_conditional("-X[0][\"counter\"] <= 0 || ~X[0][\"counter\"] != 0").success {
        return false;
    }
    matches!(sampler.bulk(), Ok(rows) if rows.len() == SENSOR_DATA.len())
}
