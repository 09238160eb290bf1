use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_raportd");
    let mut child = Command::new(exe)
        .env_remove("RAPORT_WORKSPACE")
        .env_remove("RAPORT_MISSING_POLICY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn raportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn created_id(result: &serde_json::Value, key: &str) -> String {
    result
        .get(key)
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("{key}.id missing in {result}"))
        .to_string()
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    workspace: PathBuf,
    seq: u32,
}

impl Session {
    fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Session {
            child,
            stdin,
            reader,
            workspace,
            seq: 0,
        };
        let path = s.workspace.to_string_lossy().to_string();
        s.ok("workspace.select", json!({ "path": path }));
        s
    }

    fn next_id(&mut self) -> String {
        self.seq += 1;
        format!("r{}", self.seq)
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn student(&mut self, name: &str, class_name: &str) -> String {
        let res = self.ok(
            "students.create",
            json!({ "fullName": name, "studentNumber": format!("NIS-{name}"), "className": class_name }),
        );
        created_id(&res, "student")
    }

    fn subject(&mut self, name: &str, kkm: f64) -> String {
        let res = self.ok("subjects.create", json!({ "name": name, "kkm": kkm }));
        created_id(&res, "subject")
    }

    fn score(&mut self, student_id: &str, subject_id: &str, kind: &str, value: f64) {
        self.ok(
            "scores.create",
            json!({ "studentId": student_id, "subjectId": subject_id, "type": kind, "value": value }),
        );
    }

    fn report(&mut self, student_id: &str, subject_id: &str) -> serde_json::Value {
        self.ok(
            "report.generate",
            json!({ "studentId": student_id, "subjectId": subject_id }),
        )
    }

    fn close(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.workspace);
    }
}

fn component<'a>(report: &'a serde_json::Value, kind: &str) -> &'a serde_json::Value {
    report
        .get("components")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .find(|c| c.get("type").and_then(|v| v.as_str()) == Some(kind))
        })
        .unwrap_or_else(|| panic!("component {kind} missing"))
}

fn f64_at(v: &serde_json::Value, key: &str) -> f64 {
    v.get(key)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("{key} missing in {v}"))
}

#[test]
fn missing_midterm_counts_as_zero_and_fails_kkm() {
    let mut s = Session::open("raport-report-missing");
    let student = s.student("Budi", "VIIA");
    let subject = s.subject("Matematika", 70.0);
    s.score(&student, &subject, "tugas", 75.0);
    s.score(&student, &subject, "tugas", 85.0);
    s.score(&student, &subject, "kuis", 70.0);
    s.score(&student, &subject, "uas", 75.0);

    let report = s.report(&student, &subject);
    assert_eq!(f64_at(&report, "finalScore"), 60.5);
    assert_eq!(report.get("status").and_then(|v| v.as_str()), Some("Belum Tuntas"));
    assert_eq!(
        report.get("weightSource").and_then(|v| v.as_str()),
        Some("builtin")
    );
    assert_eq!(report.get("weights"), Some(&json!({ "tugas": 30.0, "kuis": 20.0, "uts": 20.0, "uas": 30.0 })));

    let uts = component(&report, "uts");
    assert!(uts.get("average").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(f64_at(uts, "weight"), 20.0);
    assert_eq!(f64_at(uts, "weightedScore"), 0.0);

    let tugas = component(&report, "tugas");
    assert_eq!(f64_at(tugas, "average"), 80.0);
    assert_eq!(tugas.get("count").and_then(|v| v.as_u64()), Some(2));

    s.close();
}

#[test]
fn all_ninety_passes_and_threshold_equality_passes() {
    let mut s = Session::open("raport-report-pass");
    let student = s.student("Siti", "VIIB");
    let subject = s.subject("IPA", 70.0);
    for kind in ["tugas", "kuis", "uts", "uas"] {
        s.score(&student, &subject, kind, 90.0);
    }
    let report = s.report(&student, &subject);
    assert_eq!(f64_at(&report, "finalScore"), 90.0);
    assert_eq!(report.get("status").and_then(|v| v.as_str()), Some("Tuntas"));

    let exact = s.subject("IPS", 90.0);
    for kind in ["tugas", "kuis", "uts", "uas"] {
        s.score(&student, &exact, kind, 90.0);
    }
    let report = s.report(&student, &exact);
    assert_eq!(f64_at(&report, "finalScore"), 90.0);
    assert_eq!(report.get("status").and_then(|v| v.as_str()), Some("Tuntas"));

    s.close();
}

#[test]
fn weights_fall_back_from_class_to_subject_to_builtin() {
    let mut s = Session::open("raport-report-fallback");
    let a = s.student("Andi", "VIIA");
    let b = s.student("Bela", "VIIB");
    let subject = s.subject("Bahasa Indonesia", 70.0);
    for student in [&a, &b] {
        s.score(student, &subject, "tugas", 100.0);
    }

    let builtin = s.report(&a, &subject);
    assert_eq!(f64_at(&builtin, "finalScore"), 30.0);

    s.ok(
        "weights.set",
        json!({ "subjectId": subject, "tugas": 50, "kuis": 0, "uts": 0, "uas": 50 }),
    );
    let subject_wide = s.report(&a, &subject);
    assert_eq!(
        subject_wide.get("weightSource").and_then(|v| v.as_str()),
        Some("subject")
    );
    assert_eq!(f64_at(&subject_wide, "finalScore"), 50.0);

    s.ok(
        "weights.set",
        json!({ "subjectId": subject, "className": "VIIA", "tugas": 80, "kuis": 0, "uts": 0, "uas": 20 }),
    );
    let class_a = s.report(&a, &subject);
    assert_eq!(class_a.get("weightSource").and_then(|v| v.as_str()), Some("class"));
    assert_eq!(f64_at(&class_a, "finalScore"), 80.0);

    // VIIB has no class weight of its own.
    let class_b = s.report(&b, &subject);
    assert_eq!(
        class_b.get("weightSource").and_then(|v| v.as_str()),
        Some("subject")
    );
    assert_eq!(f64_at(&class_b, "finalScore"), 50.0);

    s.close();
}

#[test]
fn renormalize_policy_can_be_requested_per_report() {
    let mut s = Session::open("raport-report-policy");
    let student = s.student("Citra", "VIIA");
    let subject = s.subject("Matematika", 70.0);
    s.score(&student, &subject, "tugas", 80.0);
    s.score(&student, &subject, "kuis", 70.0);
    s.score(&student, &subject, "uas", 75.0);

    let report = s.ok(
        "report.generate",
        json!({ "studentId": student, "subjectId": subject, "policy": "renormalize" }),
    );
    assert_eq!(report.get("policy").and_then(|v| v.as_str()), Some("renormalize"));
    assert_eq!(f64_at(&report, "finalScore"), 75.62);
    assert_eq!(report.get("status").and_then(|v| v.as_str()), Some("Tuntas"));

    let bad = s.call(
        "report.generate",
        json!({ "studentId": student, "subjectId": subject, "policy": "median" }),
    );
    assert_eq!(
        bad.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    s.close();
}

#[test]
fn unknown_records_and_zero_weights_map_to_404_and_400() {
    let mut s = Session::open("raport-report-errors");
    let student = s.student("Dewi", "IXA");
    let subject = s.subject("Seni Budaya", 70.0);

    let missing = s.call(
        "report.generate",
        json!({ "studentId": "does-not-exist", "subjectId": subject }),
    );
    assert_eq!(missing.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        missing.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );
    assert_eq!(
        missing.pointer("/error/message").and_then(|v| v.as_str()),
        Some("student not found")
    );
    assert_eq!(
        missing.pointer("/error/details/status").and_then(|v| v.as_u64()),
        Some(404)
    );

    let missing_subject = s.call(
        "report.generate",
        json!({ "studentId": student, "subjectId": "nope" }),
    );
    assert_eq!(
        missing_subject.pointer("/error/message").and_then(|v| v.as_str()),
        Some("subject not found")
    );

    s.ok(
        "weights.set",
        json!({ "subjectId": subject, "className": "IXA", "tugas": 0, "kuis": 0, "uts": 0, "uas": 0 }),
    );
    let zero = s.call(
        "report.generate",
        json!({ "studentId": student, "subjectId": subject }),
    );
    assert_eq!(
        zero.pointer("/error/code").and_then(|v| v.as_str()),
        Some("invalid_configuration")
    );
    assert_eq!(
        zero.pointer("/error/details/status").and_then(|v| v.as_u64()),
        Some(400)
    );

    let no_params = s.call("report.generate", json!({ "studentId": student }));
    assert_eq!(
        no_params.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    s.close();
}

#[test]
fn report_reflects_score_changes_immediately() {
    let mut s = Session::open("raport-report-fresh");
    let student = s.student("Eko", "VIIA");
    let subject = s.subject("PJOK", 50.0);
    s.score(&student, &subject, "uas", 100.0);
    assert_eq!(f64_at(&s.report(&student, &subject), "finalScore"), 30.0);

    let listed = s.ok(
        "scores.list",
        json!({ "studentId": student, "subjectId": subject, "type": "final" }),
    );
    let score_id = listed
        .get("scores")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("score id")
        .to_string();
    s.ok(
        "scores.update",
        json!({ "scoreId": score_id, "patch": { "value": 50 } }),
    );
    assert_eq!(f64_at(&s.report(&student, &subject), "finalScore"), 15.0);

    s.ok("scores.delete", json!({ "scoreId": score_id }));
    let report = s.report(&student, &subject);
    assert_eq!(f64_at(&report, "finalScore"), 0.0);
    assert_eq!(report.get("status").and_then(|v| v.as_str()), Some("Belum Tuntas"));

    s.close();
}
