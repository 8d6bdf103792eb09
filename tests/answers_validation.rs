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
    let exe = env!("CARGO_BIN_EXE_answerd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn answerd");
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
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

fn open_workspace(prefix: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (child, stdin, reader)
}

#[test]
fn numeric_candidates_compare_as_floats() {
    let (_child, mut stdin, mut reader) = open_workspace("answerd-validate-numeric");
    let a = request_ok(&mut stdin, &mut reader, "1", "assessments.create", json!({ "name": "Maths" }));
    let assessment_id = str_field(&a, "assessmentId");
    let q = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "questions.create",
        json!({ "assessmentId": assessment_id, "name": "Q1", "questionType": "marks" }),
    );
    let question_id = str_field(&q, "questionId");
    let s = request_ok(&mut stdin, &mut reader, "3", "students.create", json!({ "name": "Ravi" }));
    let student_id = str_field(&s, "studentId");
    let op = request_ok(&mut stdin, &mut reader, "4", "operators.create", json!({ "username": "first" }));
    let operator_id = str_field(&op, "operatorId");

    // Nothing entered yet: there is no answer to check against.
    let missing = request(
        &mut stdin,
        &mut reader,
        "5",
        "answers.validate",
        json!({ "studentId": student_id, "questionId": question_id, "value": "12" }),
    );
    assert_eq!(missing["ok"], false);
    assert_eq!(missing["error"]["code"], "not_found");
    assert_eq!(missing["error"]["details"]["kind"], "answer");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "answers.submit",
        json!({
            "studentId": student_id,
            "questionId": question_id,
            "value": "3.5",
            "operatorId": operator_id,
        }),
    );

    let field = format!("student_{}_{}", student_id, question_id);
    let cases = [
        ("3.5", true),
        ("3.50", true),
        (" 3.5", true),
        ("3.6", false),
        ("ab", false),
        ("three", false),
        ("", false),
    ];
    for (i, (candidate, expected)) in cases.iter().enumerate() {
        let v = request_ok(
            &mut stdin,
            &mut reader,
            &format!("v{}", i),
            "answers.validate",
            json!({ "field": field, "value": candidate }),
        );
        assert_eq!(v["valid"], *expected, "candidate {:?}", candidate);
    }

    let missing_value = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "answers.validate",
        json!({ "field": field }),
    );
    assert_eq!(missing_value["valid"], false);
}

#[test]
fn malformed_score_is_stored_verbatim_and_never_matches() {
    let (_child, mut stdin, mut reader) = open_workspace("answerd-validate-malformed");
    let a = request_ok(&mut stdin, &mut reader, "1", "assessments.create", json!({ "name": "Maths" }));
    let assessment_id = str_field(&a, "assessmentId");
    let q = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "questions.create",
        json!({ "assessmentId": assessment_id, "name": "Q1", "questionType": 1 }),
    );
    let question_id = str_field(&q, "questionId");
    let s = request_ok(&mut stdin, &mut reader, "3", "students.create", json!({ "name": "Ravi" }));
    let student_id = str_field(&s, "studentId");
    let op = request_ok(&mut stdin, &mut reader, "4", "operators.create", json!({ "username": "first" }));
    let operator_id = str_field(&op, "operatorId");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "answers.submit",
        json!({
            "studentId": student_id,
            "questionId": question_id,
            "value": "7x",
            "operatorId": operator_id,
        }),
    );
    assert_eq!(saved["answer"]["score"], "7x");

    let v = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "answers.validate",
        json!({ "studentId": student_id, "questionId": question_id, "value": "7x" }),
    );
    assert_eq!(v["valid"], false);
}

#[test]
fn unknown_ids_and_bad_field_names_are_errors() {
    let (_child, mut stdin, mut reader) = open_workspace("answerd-validate-errors");
    let s = request_ok(&mut stdin, &mut reader, "1", "students.create", json!({ "name": "Ravi" }));
    let student_id = str_field(&s, "studentId");

    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "answers.validate",
        json!({ "studentId": student_id, "questionId": "nope", "value": "1" }),
    );
    assert_eq!(missing["ok"], false);
    assert_eq!(missing["error"]["code"], "not_found");

    let missing_student = request(
        &mut stdin,
        &mut reader,
        "3",
        "answers.validate",
        json!({ "field": "student_ghost_nope", "value": "1" }),
    );
    assert_eq!(missing_student["error"]["code"], "not_found");
    assert_eq!(missing_student["error"]["details"]["kind"], "student");

    let bad_field = request(
        &mut stdin,
        &mut reader,
        "4",
        "answers.validate",
        json!({ "field": "answer-1-2", "value": "1" }),
    );
    assert_eq!(bad_field["error"]["code"], "bad_params");
}

#[test]
fn grade_questions_match_text_case_insensitively() {
    let (_child, mut stdin, mut reader) = open_workspace("answerd-validate-grade");
    let a = request_ok(&mut stdin, &mut reader, "1", "assessments.create", json!({ "name": "Oral" }));
    let assessment_id = str_field(&a, "assessmentId");
    let q = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "questions.create",
        json!({ "assessmentId": assessment_id, "name": "Fluency", "questionType": "GRADE" }),
    );
    let question_id = str_field(&q, "questionId");
    let s = request_ok(&mut stdin, &mut reader, "3", "students.create", json!({ "name": "Meena" }));
    let student_id = str_field(&s, "studentId");
    let op = request_ok(&mut stdin, &mut reader, "4", "operators.create", json!({ "username": "first" }));
    let operator_id = str_field(&op, "operatorId");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "answers.submit",
        json!({
            "studentId": student_id,
            "questionId": question_id,
            "value": "Good",
            "operatorId": operator_id,
        }),
    );

    for (i, (candidate, expected)) in [("GOOD", true), ("good", true), ("Fair", false), ("uk", false)]
        .iter()
        .enumerate()
    {
        let v = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g{}", i),
            "answers.validate",
            json!({ "studentId": student_id, "questionId": question_id, "value": candidate }),
        );
        assert_eq!(v["valid"], *expected, "candidate {:?}", candidate);
    }
}
