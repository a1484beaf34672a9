//! CSV export of the four tables, for the `/export_csv` admin command.

use csv::WriterBuilder;

use crate::error::DatabaseError;
use crate::store::traits::{AttachmentRow, Database, REQUEST_FIELD_COLUMNS};

/// One exported table, ready to upload.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Dump every table into a semicolon-delimited CSV with a header row.
///
/// Rows are newest first.
pub async fn export_all(db: &dyn Database) -> Result<Vec<ExportFile>, DatabaseError> {
    let mut files = Vec::with_capacity(4);

    let mut header = vec!["id", "chat_id", "type"];
    header.extend(REQUEST_FIELD_COLUMNS);
    header.push("created_at");
    let requests = db.list_requests().await?;
    files.push(write_csv(
        "requests.csv",
        &header,
        requests.iter().map(|r| {
            let mut row = vec![
                r.id.to_string(),
                r.chat_id.to_string(),
                r.form_type.clone().unwrap_or_default(),
            ];
            row.extend(
                r.fields
                    .values()
                    .into_iter()
                    .map(|v| v.unwrap_or_default().to_string()),
            );
            row.push(r.created_at.clone().unwrap_or_default());
            row
        }),
    )?);

    let attachments = db.list_request_attachments().await?;
    files.push(write_csv(
        "request_attachments.csv",
        &["id", "request_id", "kind", "file_id"],
        attachments.iter().map(attachment_row),
    )?);

    let payments = db.list_payments().await?;
    files.push(write_csv(
        "payments.csv",
        &[
            "id",
            "chat_id",
            "amount_raw",
            "amount",
            "currency",
            "pay_method",
            "pay_date",
            "created_at",
        ],
        payments.iter().map(|p| {
            vec![
                p.id.to_string(),
                p.chat_id.to_string(),
                p.amount_raw.clone().unwrap_or_default(),
                p.amount.clone().unwrap_or_default(),
                p.currency.clone().unwrap_or_default(),
                p.pay_method.clone().unwrap_or_default(),
                p.pay_date.clone().unwrap_or_default(),
                p.created_at.clone().unwrap_or_default(),
            ]
        }),
    )?);

    let files_rows = db.list_payment_files().await?;
    files.push(write_csv(
        "payment_files.csv",
        &["id", "payment_id", "kind", "file_id"],
        files_rows.iter().map(attachment_row),
    )?);

    Ok(files)
}

fn attachment_row(a: &AttachmentRow) -> Vec<String> {
    vec![
        a.id.to_string(),
        a.parent_id.to_string(),
        a.kind.clone().unwrap_or_default(),
        a.file_id.clone().unwrap_or_default(),
    ]
}

fn write_csv(
    file_name: &str,
    header: &[&str],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<ExportFile, DatabaseError> {
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());

    writer
        .write_record(header)
        .map_err(|e| DatabaseError::Serialization(format!("{file_name}: {e}")))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| DatabaseError::Serialization(format!("{file_name}: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| DatabaseError::Serialization(format!("{file_name}: {e}")))?;

    Ok(ExportFile {
        file_name: file_name.to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::Attachment;
    use crate::flow::FormType;
    use crate::store::LibSqlBackend;
    use crate::store::traits::{NewPayment, NewRequest, RequestFields};

    fn text(file: &ExportFile) -> String {
        String::from_utf8(file.bytes.clone()).unwrap()
    }

    #[tokio::test]
    async fn empty_tables_still_have_headers() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let files = export_all(&db).await.unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "requests.csv",
                "request_attachments.csv",
                "payments.csv",
                "payment_files.csv"
            ]
        );
        assert!(text(&files[0]).starts_with("id;chat_id;type;route;"));
        assert_eq!(text(&files[1]).trim_end(), "id;request_id;kind;file_id");
        assert_eq!(text(&files[3]).lines().count(), 1);
    }

    #[tokio::test]
    async fn rows_are_semicolon_delimited() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let id = db
            .insert_request(&NewRequest {
                chat_id: 77,
                form_type: FormType::Flight,
                fields: RequestFields {
                    route: Some("TBS; IST".into()),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        db.insert_request_attachment(id, &Attachment::document("d1"))
            .await
            .unwrap();
        db.insert_payment(&NewPayment {
            chat_id: 77,
            amount_raw: "100 USD".into(),
            amount: "100".into(),
            currency: "USD".into(),
            pay_method: None,
            pay_date: None,
        })
        .await
        .unwrap();

        let files = export_all(&db).await.unwrap();
        let requests = text(&files[0]);
        let row = requests.lines().nth(1).unwrap();
        assert!(row.starts_with(&format!("{id};77;flight;\"TBS; IST\";")));

        assert_eq!(text(&files[1]).lines().nth(1), Some(format!("1;{id};doc;d1").as_str()));
        assert!(text(&files[2]).lines().nth(1).unwrap().contains(";100 USD;100;USD;"));
    }
}
