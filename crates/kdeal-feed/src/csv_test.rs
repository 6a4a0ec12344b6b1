use super::*;

const HEADER: &str = "aw_product_id,product_name,search_price";

#[test]
fn parse_line_splits_plain_fields() {
    assert_eq!(parse_line("a,b,c"), vec!["a", "b", "c"]);
}

#[test]
fn parse_line_trims_fields() {
    assert_eq!(parse_line(" a , b ,c "), vec!["a", "b", "c"]);
}

#[test]
fn parse_line_keeps_commas_inside_quotes() {
    assert_eq!(
        parse_line(r#"1,"Lamp, wit",9.99"#),
        vec!["1", "Lamp, wit", "9.99"]
    );
}

#[test]
fn parse_line_decodes_escaped_quotes() {
    assert_eq!(
        parse_line(r#"1,"TV 55"" 4K",499"#),
        vec!["1", "TV 55\" 4K", "499"]
    );
}

#[test]
fn parse_line_keeps_empty_trailing_field() {
    assert_eq!(parse_line("a,b,"), vec!["a", "b", ""]);
}

#[test]
fn plain_row_round_trips_through_line_serialization() {
    let values = ["123", "Koffiezetapparaat", "49.95"];
    let line = values.join(",");
    assert_eq!(parse_line(&line), values);
}

#[test]
fn empty_and_header_only_inputs_yield_no_rows() {
    assert!(parse_feed("", None).rows.is_empty());
    assert!(parse_feed(HEADER, None).rows.is_empty());
    assert!(parse_feed(&format!("{HEADER}\n"), None).rows.is_empty());
}

#[test]
fn rows_are_keyed_by_header() {
    let text = format!("{HEADER}\n1,Lamp,9.99\n2,Stoel,19.99\n");
    let parsed = parse_feed(&text, None);
    assert_eq!(parsed.rows.len(), 2);
    assert_eq!(parsed.rows[1].get("product_name"), Some("Stoel"));
    assert_eq!(parsed.rows[1].get("search_price"), Some("19.99"));
}

#[test]
fn header_is_first_non_empty_line() {
    let text = format!("\n\n{HEADER}\n1,Lamp,9.99");
    let doc = FeedDocument::new(&text);
    assert_eq!(doc.header(), ["aw_product_id", "product_name", "search_price"]);
    assert_eq!(doc.rows(None).rows.len(), 1);
}

#[test]
fn byte_order_mark_is_stripped_from_header() {
    let text = format!("\u{feff}{HEADER}\n1,Lamp,9.99");
    let parsed = parse_feed(&text, None);
    assert_eq!(parsed.rows[0].get("aw_product_id"), Some("1"));
}

#[test]
fn malformed_lines_are_skipped_and_counted() {
    let text = format!("{HEADER}\n1,Lamp,9.99\n2,Stoel\n3,Tafel,99,extra\n4,Bank,299\n");
    let parsed = parse_feed(&text, None);
    assert_eq!(parsed.rows.len(), 2);
    assert_eq!(parsed.skipped_rows, 2);
    assert_eq!(parsed.lines_scanned, 4);
}

#[test]
fn crlf_line_endings_are_accepted() {
    let text = format!("{HEADER}\r\n1,Lamp,9.99\r\n");
    let parsed = parse_feed(&text, None);
    assert_eq!(parsed.rows[0].get("search_price"), Some("9.99"));
}

#[test]
fn max_rows_stops_scanning_early() {
    let mut text = HEADER.to_owned();
    for i in 0..100 {
        text.push_str(&format!("\n{i},Product {i},1.00"));
    }
    let parsed = parse_feed(&text, Some(10));
    assert_eq!(parsed.rows.len(), 10);
    assert_eq!(parsed.lines_scanned, 10);
}

#[test]
fn window_reads_only_its_span() {
    let text = format!("{HEADER}\n1,A,1\n2,B,2\n3,C,3\n4,D,4\n5,E,5");
    let doc = FeedDocument::new(&text);
    let window = doc.window(2, 2);
    let ids: Vec<_> = window
        .rows
        .iter()
        .map(|r| r.get("aw_product_id").unwrap())
        .collect();
    assert_eq!(ids, ["3", "4"]);
    assert!(doc.window(10, 5).rows.is_empty());
}

#[test]
fn retain_identified_drops_rows_without_id_or_title() {
    let text = format!("{HEADER}\n1,Lamp,9.99\n,Stoel,1\n3,,2\n");
    let mut parsed = parse_feed(&text, None);
    assert_eq!(parsed.retain_identified(), 2);
    assert_eq!(parsed.rows.len(), 1);
}

#[test]
fn identified_row_count_ignores_blank_malformed_and_anonymous_lines() {
    let text = format!("{HEADER}\n1,Lamp,9.99\n\n2,kapot\n,Stoel,1\n5,Bank,199\n");
    let doc = FeedDocument::new(&text);
    assert_eq!(doc.data_line_count(), 5);
    assert_eq!(doc.identified_row_count(), 2);
}
