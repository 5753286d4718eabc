use crate::output::{print_json, print_table};
use anyhow::Context;
use cardsync_core::{
    document::WorkItemDocument, hierarchy, lock::CardLock, section::SectionKind,
};
use std::path::Path;

fn summary(doc: &WorkItemDocument, archived: bool) -> serde_json::Value {
    serde_json::json!({
        "id": doc.id,
        "type": doc.item_type,
        "lane": doc.lane,
        "status": doc.status.to_string(),
        "issue": doc.issue,
        "pull_request": doc.pull_request,
        "parent": doc.parent,
        "revision": doc.revision,
        "title": doc.title(),
        "archived": archived,
    })
}

fn number(n: Option<u64>) -> String {
    n.map(|n| format!("#{n}")).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

pub fn list(root: &Path, archived: bool, json: bool) -> anyhow::Result<()> {
    let mut cards: Vec<(WorkItemDocument, bool)> = WorkItemDocument::list(root)
        .context("failed to list cards")?
        .into_iter()
        .map(|d| (d, false))
        .collect();
    if archived {
        let old = WorkItemDocument::list_archived(root).context("failed to list archived cards")?;
        cards.extend(old.into_iter().map(|d| (d, true)));
    }

    if json {
        let summaries: Vec<_> = cards.iter().map(|(d, a)| summary(d, *a)).collect();
        print_json(&summaries)?;
        return Ok(());
    }

    if cards.is_empty() {
        println!("No cards yet.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = cards
        .iter()
        .map(|(d, archived)| {
            vec![
                d.id.clone(),
                d.lane.clone(),
                if *archived { format!("{} (archived)", d.status) } else { d.status.to_string() },
                number(d.issue),
                number(d.pull_request),
                d.title().unwrap_or_default().to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "LANE", "STATUS", "ISSUE", "PR", "TITLE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

pub fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let stored = WorkItemDocument::load_stored(root, id)
        .with_context(|| format!("failed to load card '{id}'"))?;
    let doc = &stored.doc;

    if json {
        let mut value = summary(doc, stored.archived);
        value["sub_issues"] = serde_json::to_value(doc.sub_issues())?;
        value["acceptance_checklist"] = serde_json::to_value(doc.acceptance_checklist())?;
        print_json(&value)?;
        return Ok(());
    }

    println!("Card:     {}", doc.id);
    if let Some(title) = doc.title() {
        println!("Title:    {title}");
    }
    println!("Lane:     {}", doc.lane);
    if let Some(t) = doc.item_type {
        println!("Type:     {t}");
    }
    println!(
        "Status:   {}{}",
        doc.status,
        if stored.archived { " (archived)" } else { "" }
    );
    if let Some(n) = doc.issue {
        println!("Issue:    #{n}");
    }
    if let Some(n) = doc.pull_request {
        println!("PR:       #{n}");
    }
    if let Some(p) = &doc.parent {
        println!("Parent:   {p}");
    }
    println!("Revision: {}", doc.revision);

    let subs = doc.sub_issues();
    if !subs.is_empty() {
        println!("\n{} ({}):", SectionKind::SubIssues, subs.len());
        for sub in &subs {
            println!("  {}", sub.render(sub.checked));
        }
    }

    let checklist = doc.acceptance_checklist();
    if !checklist.is_empty() {
        let done = checklist.iter().filter(|i| i.checked).count();
        println!("\n{} ({done}/{}):", SectionKind::AcceptanceChecklist, checklist.len());
        for item in &checklist {
            println!("  [{}] {}", if item.checked { "x" } else { " " }, item.text);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// link
// ---------------------------------------------------------------------------

pub fn link(root: &Path, id: &str, tag: &str, number: u64, json: bool) -> anyhow::Result<()> {
    let _lock = CardLock::acquire(root, id)?;
    let mut doc = WorkItemDocument::load(root, id)
        .with_context(|| format!("failed to load card '{id}'"))?;
    hierarchy::link(&mut doc, tag, number)?;
    doc.revision += 1;
    doc.save(root)
        .with_context(|| format!("failed to save card '{id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "id": id,
            "tag": tag,
            "number": number,
            "revision": doc.revision,
        }))?;
    } else {
        println!("Linked {tag} to #{number} in {id}.");
    }
    Ok(())
}
