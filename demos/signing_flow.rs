//! Walks one document through the full signing flow against an on-disk sled
//! database and prints the resulting audit trail.
//!
//! `RUST_LOG=doc_signing=debug cargo run --example signing_flow`
use doc_signing::{
    document::{DocumentDraft, OriginKind},
    events::DomainEvent,
    service::SignatureService,
    store::SledStore,
};
use std::sync::{Arc, mpsc};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let db = sled::open("sled")?;
    if !db.is_empty() {
        db.clear()?;
    }

    let (tx, rx) = mpsc::channel::<DomainEvent>();
    let service = SignatureService::new(SledStore::new(Arc::new(db))).with_notifier(tx);

    let draft = DocumentDraft::new()
        .set_title("Employment contract")
        .set_description("Permanent, full time")
        .set_content(b"contract body".to_vec())
        .set_origin(OriginKind::Editor)
        .set_created_by("hr-admin")
        .set_actor_address("127.0.0.1")
        .add_signer("Ada Lovelace", "ada@example.com", "employee")
        .add_signer("Grace Hopper", "grace@example.com", "manager");

    let doc = service.create_document(draft)?;
    let employee = doc.signers()[0].id().to_string();
    let manager = doc.signers()[1].id().to_string();

    service.send_for_signing(doc.id(), "hr-admin")?;
    service.record_view(doc.id(), &employee, "203.0.113.7")?;
    service.apply_signature(doc.id(), &employee, b"ada-signature".to_vec(), "203.0.113.7")?;
    let doc = service.apply_signature(doc.id(), &manager, b"grace-signature".to_vec(), "198.51.100.4")?;

    println!("{} is {:?} at version {}", doc.id(), doc.status(), doc.version());
    println!("{}", doc.view_history());
    println!("chain verified: {}", service.verify_chain(doc.id())?);

    for event in rx.try_iter() {
        println!("notify: {event:?}");
    }

    Ok(())
}
