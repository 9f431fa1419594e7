//! Helpers for the per-item detail endpoints that answer in XML
//!
//! Every XML payload from the open-data service wraps its content in a
//! `<dados>` element. Parsing happens here at the I/O boundary; stages only
//! ever see the typed detail structs built from these helpers.

/// Find the `<dados>` element of a detail document.
pub(crate) fn dados_root<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
) -> Option<roxmltree::Node<'a, 'input>> {
    doc.descendants().find(|node| node.has_tag_name("dados"))
}

/// Trimmed text of the first descendant with the given tag name, if any.
pub(crate) fn descendant_text(node: roxmltree::Node<'_, '_>, tag: &str) -> Option<String> {
    node.descendants()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Parse a decimal integer, rejecting anything with non-digit characters.
pub(crate) fn parse_int(text: Option<&str>) -> Option<i64> {
    let text = text?;
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_dados_and_reads_nested_text() {
        let doc = roxmltree::Document::parse(
            "<xml><dados><status><situacao>Ativo</situacao></status></dados></xml>",
        )
        .unwrap();
        let dados = dados_root(&doc).unwrap();
        assert_eq!(descendant_text(dados, "situacao").as_deref(), Some("Ativo"));
        assert_eq!(descendant_text(dados, "missing"), None);
    }

    #[test]
    fn parse_int_rejects_non_numeric_text() {
        assert_eq!(parse_int(Some("57")), Some(57));
        assert_eq!(parse_int(Some(" 57 ")), None);
        assert_eq!(parse_int(Some("abc")), None);
        assert_eq!(parse_int(Some("")), None);
        assert_eq!(parse_int(None), None);
    }
}
