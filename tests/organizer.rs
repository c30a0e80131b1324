//! End-to-end organizer pipeline tests against in-memory storage with a
//! scripted generative provider.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use dockeep::classify::Classifier;
use dockeep::config::OrganizerConfig;
use dockeep::error::GenAiError;
use dockeep::extract::MIME_DOCX;
use dockeep::genai::{GenAi, GenerateResponse, Part};
use dockeep::ocr::DisabledOcr;
use dockeep::organizer::{prune, reconcile, Organizer};
use dockeep::storage::{memory::MemoryStorage, Storage};

const MERGE_CUTOFF: f64 = 0.4;

enum Script {
    Reply(&'static str),
    Quota,
}

/// Provider that matches a needle against the first text part of the
/// request and replies per script. Unmatched requests error so a test
/// cannot silently classify something it never scripted.
struct ScriptedGenAi {
    rules: Vec<(&'static str, Script)>,
    calls: AtomicUsize,
}

impl ScriptedGenAi {
    fn new(rules: Vec<(&'static str, Script)>) -> Self {
        Self {
            rules,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenAi for ScriptedGenAi {
    async fn generate(&self, parts: &[Part]) -> Result<GenerateResponse, GenAiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = parts
            .iter()
            .find_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .unwrap_or("");

        for (needle, script) in &self.rules {
            if prompt.contains(needle) {
                return match script {
                    Script::Reply(category) => Ok(GenerateResponse::from_text(format!(
                        "**Category:** {}\nTags: a, b, c",
                        category
                    ))),
                    Script::Quota => Err(GenAiError::Quota("scripted quota".to_string())),
                };
            }
        }
        Err(GenAiError::Provider(format!(
            "unscripted prompt: {}",
            prompt
        )))
    }
}

/// Minimal DOCX whose extracted text is exactly `text`.
fn docx(text: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            text
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn organizer(storage: Arc<MemoryStorage>, genai: Arc<dyn GenAi>) -> Organizer {
    let storage: Arc<dyn Storage> = storage;
    Organizer::new(
        storage,
        Classifier::new(genai),
        Box::new(DisabledOcr),
        OrganizerConfig::default(),
    )
}

#[tokio::test]
async fn category_variants_resolve_to_a_single_folder() {
    let storage = Arc::new(MemoryStorage::new());
    let f1 = storage.seed_file("inv-jan.docx", MIME_DOCX, &["root"], &docx("january invoice"));
    let f2 = storage.seed_file("inv-feb.docx", MIME_DOCX, &["root"], &docx("february invoice"));
    let f3 = storage.seed_file("inv-mar.docx", MIME_DOCX, &["root"], &docx("march invoice"));

    // Three spellings of the same category come back from the model.
    let genai = Arc::new(ScriptedGenAi::new(vec![
        ("january", Script::Reply("Invoice")),
        ("february", Script::Reply("Invoices")),
        ("march", Script::Reply("invoices")),
    ]));

    let org = organizer(storage.clone(), genai);
    let report = org.run_batch(false).await.unwrap();

    assert_eq!(report.files_found, 3);
    assert_eq!(report.classified, 3);
    assert_eq!(report.moved, 3);
    assert_eq!(report.folders_created, 1);
    assert!(report.uncategorized.is_empty());

    // One physical folder, created exactly once, holding all three files.
    assert_eq!(storage.create_folder_calls(), 1);
    assert_eq!(storage.folder_names().len(), 1);
    let folder = storage.folder_names().remove(0);
    for id in [&f1, &f2, &f3] {
        let parents = storage.file_parents(id);
        assert_eq!(parents.len(), 1, "file should have exactly one parent");
        assert!(!parents.contains(&"root".to_string()));
    }
    assert!(["Invoice", "Invoices", "invoices"].contains(&folder.as_str()));
}

#[tokio::test]
async fn quota_on_one_file_degrades_without_aborting_the_batch() {
    let storage = Arc::new(MemoryStorage::new());
    let ok = storage.seed_file("report.docx", MIME_DOCX, &["root"], &docx("annual report"));
    let bad = storage.seed_file("broken.docx", MIME_DOCX, &["root"], &docx("rate limited text"));

    let genai = Arc::new(ScriptedGenAi::new(vec![
        ("annual report", Script::Reply("Reports")),
        ("rate limited", Script::Quota),
    ]));

    let org = organizer(storage.clone(), genai);
    let report = org.run_batch(false).await.unwrap();

    assert_eq!(report.files_found, 2);
    assert_eq!(report.classified, 1);
    assert_eq!(report.uncategorized, vec!["broken.docx".to_string()]);
    // Both files still move: one to Reports, one to Uncategorized.
    assert_eq!(report.moved, 2);
    assert_eq!(
        storage.folder_names(),
        vec!["Reports".to_string(), "Uncategorized".to_string()]
    );
    assert_ne!(storage.file_parents(&ok), storage.file_parents(&bad));
}

#[tokio::test]
async fn blank_extraction_short_circuits_the_provider() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed_file("garbage.docx", MIME_DOCX, &["root"], b"not a zip archive");

    let genai = Arc::new(ScriptedGenAi::new(vec![]));
    let org = organizer(storage.clone(), genai.clone());
    let report = org.run_batch(false).await.unwrap();

    assert_eq!(genai.calls(), 0);
    assert_eq!(report.classified, 0);
    assert_eq!(report.uncategorized, vec!["garbage.docx".to_string()]);
    assert_eq!(storage.folder_names(), vec!["Uncategorized".to_string()]);
}

#[tokio::test]
async fn dry_run_classifies_but_touches_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    let id = storage.seed_file("memo.docx", MIME_DOCX, &["root"], &docx("quarterly memo"));

    let genai = Arc::new(ScriptedGenAi::new(vec![(
        "quarterly",
        Script::Reply("Memos"),
    )]));
    let org = organizer(storage.clone(), genai);
    let report = org.run_batch(true).await.unwrap();

    assert_eq!(report.files_found, 1);
    assert_eq!(report.classified, 1);
    assert_eq!(report.moved, 0);
    assert_eq!(report.folders_created, 0);
    assert_eq!(storage.create_folder_calls(), 0);
    assert_eq!(storage.file_parents(&id), vec!["root".to_string()]);
}

#[tokio::test]
async fn existing_folder_is_matched_instead_of_created() {
    let storage = Arc::new(MemoryStorage::new());
    let existing = storage.seed_folder("Invoices");
    let id = storage.seed_file("inv.docx", MIME_DOCX, &["root"], &docx("an invoice"));

    let genai = Arc::new(ScriptedGenAi::new(vec![(
        "an invoice",
        Script::Reply("invoice"),
    )]));
    let org = organizer(storage.clone(), genai);
    let report = org.run_batch(false).await.unwrap();

    assert_eq!(report.folders_created, 0);
    assert_eq!(storage.create_folder_calls(), 0);
    assert_eq!(storage.file_parents(&id), vec![existing]);
}

#[tokio::test]
async fn reconcile_merges_duplicates_into_the_shortest_name() {
    let storage = Arc::new(MemoryStorage::new());
    let canonical = storage.seed_folder("Invoice");
    let dup = storage.seed_folder("Invoices");
    let unrelated = storage.seed_folder("Tax Returns 2024");
    let in_dup = storage.seed_file("inv.docx", MIME_DOCX, &[dup.as_str()], &docx("x"));
    let in_unrelated =
        storage.seed_file("tax.docx", MIME_DOCX, &[unrelated.as_str()], &docx("y"));

    let report = reconcile(&*storage, MERGE_CUTOFF).await.unwrap();

    assert_eq!(report.clusters, 1);
    assert_eq!(report.folders_merged, 1);
    assert_eq!(report.files_moved, 1);
    assert_eq!(storage.file_parents(&in_dup), vec![canonical]);
    assert_eq!(storage.file_parents(&in_unrelated), vec![unrelated]);
    assert_eq!(
        storage.folder_names(),
        vec!["Invoice".to_string(), "Tax Returns 2024".to_string()]
    );
}

#[tokio::test]
async fn reconcile_reparents_subfolders_before_deleting_the_duplicate() {
    let storage = Arc::new(MemoryStorage::new());
    let canonical = storage.seed_folder("Projects");
    let dup = storage.seed_folder("projects ");
    let nested = storage.seed_subfolder("2024", &dup);
    let in_nested = storage.seed_file("plan.docx", MIME_DOCX, &[nested.as_str()], &docx("p"));
    let in_dup = storage.seed_file("notes.docx", MIME_DOCX, &[dup.as_str()], &docx("n"));

    let report = reconcile(&*storage, MERGE_CUTOFF).await.unwrap();

    assert_eq!(report.folders_merged, 1);
    assert_eq!(report.files_moved, 1);
    assert_eq!(report.folders_moved, 1);
    // The nested folder survives the merge, reparented under the
    // canonical folder with its own file untouched.
    assert_eq!(storage.folder_parents(&nested), vec![canonical.clone()]);
    assert_eq!(storage.file_parents(&in_nested), vec![nested]);
    assert_eq!(storage.file_parents(&in_dup), vec![canonical]);
    assert_eq!(
        storage.folder_names(),
        vec!["2024".to_string(), "Projects".to_string()]
    );
}

#[tokio::test]
async fn prune_deletes_only_empty_folders_and_is_idempotent() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed_folder("Empty");
    let full = storage.seed_folder("Full");
    storage.seed_file("doc.docx", MIME_DOCX, &[full.as_str()], &docx("z"));

    let report = prune(&*storage).await.unwrap();
    assert_eq!(report.folders_checked, 2);
    assert_eq!(report.folders_deleted, 1);
    assert_eq!(storage.folder_names(), vec!["Full".to_string()]);

    let again = prune(&*storage).await.unwrap();
    assert_eq!(again.folders_checked, 1);
    assert_eq!(again.folders_deleted, 0);
}

#[tokio::test]
async fn reconcile_then_prune_removes_merged_husks() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed_folder("Receipts");
    let dup = storage.seed_folder("receipts ");
    storage.seed_file("r1.docx", MIME_DOCX, &[dup.as_str()], &docx("r"));

    reconcile(&*storage, MERGE_CUTOFF).await.unwrap();
    let report = prune(&*storage).await.unwrap();

    // The duplicate was already deleted by reconcile; prune finds the
    // canonical folder occupied and leaves it alone.
    assert_eq!(report.folders_deleted, 0);
    assert_eq!(storage.folder_names(), vec!["Receipts".to_string()]);
}
