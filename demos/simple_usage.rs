/// Walks through the main `Index` operations end to end: ingest, search,
/// faceting, suggestions, query expansion, and segment merging.
use paperfind_core::{Config, Document, FacetRequest, FieldValue, Index, QueryRequest};

fn paper(id: &str, title: &str, abstract_text: &str, subjects: &[&str]) -> Document {
    Document::new(id)
        .with_field("title", FieldValue::Text(title.to_string()))
        .with_field("abstract", FieldValue::Text(abstract_text.to_string()))
        .with_field(
            "subject",
            FieldValue::List(subjects.iter().map(|s| s.to_string()).collect()),
        )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = Config {
        storage_path: dir.path().to_path_buf(),
        max_docs_per_segment: 2,
        ..Config::default()
    };
    let index = Index::open(config)?;

    println!("Indexing papers...");
    index.add_document(paper(
        "p1",
        "Quick Sorting Algorithms",
        "A survey of quick sorting strategies for large datasets",
        &["cs.DS"],
    ))?;
    index.add_document(paper(
        "p2",
        "Lazy Evaluation in Functional Languages",
        "Lazy dogs never sort anything, but lazy evaluation helps",
        &["cs.PL"],
    ))?;
    index.add_document(paper(
        "p3",
        "Database Indexing Structures",
        "B-trees and inverted indexes for database systems",
        &["cs.DB"],
    ))?;

    let outcomes = index.add_documents(vec![
        paper("p4", "Distributed Consensus", "Raft and Paxos compared", &["cs.DC"]),
        paper("p1", "Duplicate External Id", "Should fail", &["cs.DS"]),
    ]);
    for outcome in outcomes {
        match outcome {
            paperfind_core::IngestOutcome::Indexed(id) => println!("  indexed as {:?}", id),
            paperfind_core::IngestOutcome::Failed(external_id, err) => {
                println!("  {external_id} failed: {err}")
            }
        }
    }

    let request = QueryRequest {
        query: "quick sort".to_string(),
        facets: vec![FacetRequest {
            field: "subject".to_string(),
            num_values: 5,
        }],
        ..QueryRequest::default()
    };
    let response = index.search(&request)?;
    println!("'quick sort': {} hits", response.total_hits);
    for hit in &response.hits {
        println!("  {} (score {:.3})", hit.id, hit.score);
    }
    for (field, counts) in &response.facets {
        println!("  facet {field}: {counts:?}");
    }

    println!("suggestions for 'qui': {:?}", index.suggest("qui", Some(5)));
    println!("expansions for 'sort': {:?}", index.expand_query("sort"));

    index.save()?;
    index.optimize()?;
    println!("optimize complete");

    Ok(())
}
