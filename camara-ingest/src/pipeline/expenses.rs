//! Expense ingestion stage
//!
//! Downloads the year's compressed expense archive (cached on disk so
//! re-runs never re-download), extracts it, validates every record, resolves
//! the legislator foreign key, and stages all surviving rows in one batch.

use crate::db::expenses::{self, NewExpense};
use crate::db::legislators;
use crate::services::OpenDataClient;
use anyhow::{bail, Context, Result};
use camara_common::events::ProgressBus;
use serde::Deserialize;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One record of the bulk expense file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    pub valor_liquido: Option<f64>,
    pub id_deputado: Option<i64>,
    pub ano: Option<i64>,
    pub mes: Option<i64>,
    pub tipo_despesa: Option<String>,
    pub tipo_documento: Option<String>,
    pub url_documento: Option<String>,
    pub nome_fornecedor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExpenseFile {
    dados: Vec<ExpenseRecord>,
}

/// Make sure the year's decompressed expense JSON exists locally,
/// downloading and extracting only what is missing.
///
/// Both artifacts live at deterministic paths keyed by year; an existing
/// file is reused as-is, which keeps re-runs off the network.
async fn ensure_expense_file(
    client: &OpenDataClient,
    cache_dir: &Path,
    year: i32,
    progress: &ProgressBus,
) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)?;

    let zip_path = cache_dir.join(format!("despesas_{}.json.zip", year));
    let json_path = cache_dir.join(format!("despesas_{}.json", year));

    if !zip_path.exists() {
        progress.log(format!(
            "   - Downloading the expense archive for year {}...",
            year
        ));
        let url = format!("{}/Ano-{}.json.zip", client.expense_archive_base(), year);
        client
            .download_to_file(&url, &zip_path)
            .await
            .with_context(|| format!("could not download the expense archive for year {}", year))?;
        progress.log(format!("   - Archive saved to '{}'", zip_path.display()));
    } else {
        progress.log(format!(
            "   - File '{}' already exists locally.",
            zip_path.display()
        ));
    }

    if !json_path.exists() {
        progress.log(format!(
            "   - Extracting archive to '{}'...",
            json_path.display()
        ));
        if let Err(err) = extract_first_member(&zip_path, &json_path) {
            if json_path.exists() {
                let _ = std::fs::remove_file(&json_path);
            }
            return Err(err)
                .with_context(|| format!("could not extract the expense archive for year {}", year));
        }
        progress.log(format!("   - JSON file saved to '{}'", json_path.display()));
    } else {
        progress.log(format!(
            "   - File '{}' already exists locally.",
            json_path.display()
        ));
    }

    Ok(json_path)
}

/// Extract the first (only) member of the archive to `dest`.
fn extract_first_member(zip_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    if archive.len() == 0 {
        bail!("archive '{}' has no members", zip_path.display());
    }

    let mut entry = archive.by_index(0)?;
    let mut out = std::fs::File::create(dest)?;
    std::io::copy(&mut entry, &mut out)?;

    Ok(())
}

/// Validate the bulk records and resolve legislator foreign keys.
///
/// Records missing a net value or an unresolvable legislator reference are
/// dropped; the second element of the return is how many were dropped.
pub(crate) fn build_expense_rows(
    records: Vec<ExpenseRecord>,
    legislator_map: &HashMap<i64, i64>,
) -> (Vec<NewExpense>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for record in records {
        let Some(net_value) = record.valor_liquido else {
            skipped += 1;
            continue;
        };
        let Some(source_id) = record.id_deputado else {
            skipped += 1;
            continue;
        };
        let Some(&legislator_id) = legislator_map.get(&source_id) else {
            skipped += 1;
            continue;
        };

        rows.push(NewExpense {
            legislator_id,
            year: record.ano,
            month: record.mes,
            category: record.tipo_despesa,
            net_value,
            document_type: record.tipo_documento,
            document_uri: record.url_documento,
            supplier_name: record.nome_fornecedor,
        });
    }

    (rows, skipped)
}

/// Fetch and stage all expenses for one year.
pub async fn ingest_expenses(
    conn: &mut SqliteConnection,
    client: &OpenDataClient,
    cache_dir: &Path,
    year: i32,
    progress: &ProgressBus,
) -> Result<()> {
    progress.log(format!(
        "-> Starting expense processing for year {}...",
        year
    ));

    if expenses::any_exists(conn).await? {
        progress.log(format!(
            "-> Expenses for year {} already present in the store. Stage complete.",
            year
        ));
        return Ok(());
    }

    progress.log(format!(
        "   - No expenses found for {}. Starting collection...",
        year
    ));

    let json_path = ensure_expense_file(client, cache_dir, year, progress).await?;

    progress.log("   - Building the legislator map for foreign keys...");
    let legislator_map = legislators::source_id_to_id_map(conn).await?;

    progress.log(format!(
        "   - Reading local file '{}'...",
        json_path.display()
    ));
    let text = std::fs::read_to_string(&json_path)?;
    // Bulk files occasionally ship with a UTF-8 BOM
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let parsed: ExpenseFile = serde_json::from_str(text)
        .with_context(|| format!("expense file '{}' is not valid JSON", json_path.display()))?;

    let total = parsed.dados.len();
    let (rows, skipped) = build_expense_rows(parsed.dados, &legislator_map);

    tracing::info!(year, total, staged = rows.len(), skipped, "Expense records validated");

    if !rows.is_empty() {
        progress.log(format!(
            "   - Adding {} new expenses to the store...",
            rows.len()
        ));
        expenses::insert_batch(conn, &rows).await?;
    }

    progress.log("-> Expense processing complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(net_value: Option<f64>, legislator: Option<i64>) -> ExpenseRecord {
        ExpenseRecord {
            valor_liquido: net_value,
            id_deputado: legislator,
            ano: Some(2012),
            mes: Some(3),
            tipo_despesa: Some("COMBUSTÍVEIS E LUBRIFICANTES".into()),
            tipo_documento: Some("Nota Fiscal".into()),
            url_documento: None,
            nome_fornecedor: Some("POSTO CENTRAL".into()),
        }
    }

    #[test]
    fn drops_records_without_net_value_or_legislator() {
        let mut map = HashMap::new();
        map.insert(100, 1);

        let (rows, skipped) = build_expense_rows(
            vec![
                record(Some(150.0), Some(100)),
                record(None, Some(100)),
                record(Some(80.0), None),
            ],
            &map,
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(skipped, 2);
        assert_eq!(rows[0].legislator_id, 1);
        assert_eq!(rows[0].net_value, 150.0);
    }

    #[test]
    fn drops_records_with_unresolvable_legislator() {
        let mut map = HashMap::new();
        map.insert(100, 1);

        let (rows, skipped) = build_expense_rows(
            vec![record(Some(10.0), Some(100)), record(Some(20.0), Some(999))],
            &map,
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn expense_file_deserializes_bulk_fields() {
        let parsed: ExpenseFile = serde_json::from_str(
            r#"{"dados": [{
                "idDeputado": 123,
                "valorLiquido": 99.5,
                "ano": 2012,
                "mes": 7,
                "tipoDespesa": "PASSAGENS AÉREAS",
                "tipoDocumento": "Recibo",
                "urlDocumento": "http://example.org/doc.pdf",
                "nomeFornecedor": "CIA AÉREA"
            }]}"#,
        )
        .unwrap();

        assert_eq!(parsed.dados.len(), 1);
        let rec = &parsed.dados[0];
        assert_eq!(rec.id_deputado, Some(123));
        assert_eq!(rec.valor_liquido, Some(99.5));
        assert_eq!(rec.tipo_despesa.as_deref(), Some("PASSAGENS AÉREAS"));
    }

    #[test]
    fn bom_is_stripped_before_parsing() {
        let text = "\u{feff}{\"dados\": []}";
        let stripped = text.strip_prefix('\u{feff}').unwrap_or(text);
        let parsed: ExpenseFile = serde_json::from_str(stripped).unwrap();
        assert!(parsed.dados.is_empty());
    }
}
