use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use pst2mbox::convert::builder::{BuildOptions, RecordBuilder};
use pst2mbox::export::mime::render_message;
use pst2mbox::model::attachment::AttachmentTally;
use pst2mbox::source::json::JsonMessage;

fn sample_message(with_attachment: bool) -> JsonMessage {
    let mut record = json!({
        "subject": "Quarterly report",
        "plain_text_body": "Please find the figures below.\n".repeat(40),
        "html_body": "<p>Please find the figures below.</p>".repeat(40),
        "sender_name": "Alice Example",
        "sender_email_address": "alice@example.com",
        "delivery_time": "2024-01-15T10:30:00+00:00",
        "recipients": [
            {"name": "Bob", "email_address": "bob@example.com"},
            {"name": "Zoë", "email_address": "zoe@example.com"}
        ]
    });
    if with_attachment {
        record["attachments"] = json!([{
            "name": "figures.csv",
            "size": 3,
            "data": "YSxi"
        }]);
    }
    match record {
        Value::Object(fields) => JsonMessage::from_fields(fields),
        _ => unreachable!(),
    }
}

fn builder() -> RecordBuilder {
    RecordBuilder::new(BuildOptions {
        no_subject: "(No Subject)".to_string(),
        no_content: "(No content)".to_string(),
    })
}

fn bench_build_record(c: &mut Criterion) {
    let builder = builder();
    let message = sample_message(false);

    c.bench_function("build_alternative_record", |b| {
        b.iter(|| {
            let mut tally = AttachmentTally::default();
            builder.build(&message, "Inbox", &mut tally).unwrap()
        })
    });
}

fn bench_render_record(c: &mut Criterion) {
    let builder = builder();
    let message = sample_message(true);
    let mut tally = AttachmentTally::default();
    let record = builder.build(&message, "Inbox", &mut tally).unwrap();

    c.bench_function("render_mixed_record", |b| b.iter(|| render_message(&record)));
}

criterion_group!(benches, bench_build_record, bench_render_record);
criterion_main!(benches);
