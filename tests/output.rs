use std::fs;

use camino::Utf8PathBuf;
use tempfile::tempdir;

use evidence_harvester::domain::{CARD_COLUMNS, CardRow, STUDY_COLUMNS, StudyRow};
use evidence_harvester::output::{read_cards, read_studies, write_cards, write_studies};

fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).unwrap()
}

fn card_row() -> CardRow {
    CardRow {
        card_id: "card_a".to_string(),
        entity_type: "feature".to_string(),
        entity_name: "Stemless humeral component".to_string(),
        outcome: "revision, any cause".to_string(),
        comparator: "stemmed".to_string(),
        bottom_line: String::new(),
        certainty: String::new(),
        registry_njr: "https://reports.njrcentre.org.uk".to_string(),
        registry_aoanjrr: String::new(),
        registry_ajrr: String::new(),
        last_updated: "2024-03-09".to_string(),
        tags: "shoulder;implant".to_string(),
    }
}

#[test]
fn empty_tables_keep_their_header() {
    let dir = tempdir().unwrap();
    let cards = utf8(dir.path().join("evidence_cards.csv"));
    let studies = utf8(dir.path().join("evidence_studies.csv"));

    write_cards(&cards, &[]).unwrap();
    write_studies(&studies, &[]).unwrap();

    assert_eq!(fs::read_to_string(&cards).unwrap(), format!("{}\n", CARD_COLUMNS.join(",")));
    assert_eq!(
        fs::read_to_string(&studies).unwrap(),
        format!("{}\n", STUDY_COLUMNS.join(","))
    );
}

#[test]
fn rows_follow_header_order_and_read_back() {
    let dir = tempdir().unwrap();
    let path = utf8(dir.path().join("out").join("evidence_cards.csv"));

    write_cards(&path, &[card_row()]).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some(CARD_COLUMNS.join(",").as_str()));
    assert_eq!(
        lines.next(),
        Some(
            "card_a,feature,Stemless humeral component,\"revision, any cause\",stemmed,,,\
             https://reports.njrcentre.org.uk,,,2024-03-09,shoulder;implant"
        )
    );
    assert_eq!(read_cards(&path).unwrap(), vec![card_row()]);
}

#[test]
fn studies_round_trip_through_csv() {
    let dir = tempdir().unwrap();
    let path = utf8(dir.path().join("evidence_studies.csv"));
    let study = StudyRow {
        card_id: "card_a".to_string(),
        study_id: "doi:10.1/a".to_string(),
        study_type: "primary_study".to_string(),
        title: "A \"quoted\" title".to_string(),
        year: "2021".to_string(),
        doi_or_link: "https://doi.org/10.1/a".to_string(),
        design: "primary_study".to_string(),
        funding: "NIH; Wellcome Trust".to_string(),
        source_api: "PubMed/Crossref/Unpaywall".to_string(),
        notes: "Candidate RCT/cohort; classify later (RoB 2 / ROBINS-I).".to_string(),
        ..StudyRow::default()
    };

    write_studies(&path, std::slice::from_ref(&study)).unwrap();
    assert_eq!(read_studies(&path).unwrap(), vec![study]);
}
