//! Reads generated package descriptors back and checks their references.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("failed to parse {0}")]
    Parse(&'static str),
    #[error("item {item} references missing resource {resource}")]
    DanglingRef { item: String, resource: String },
    #[error("duplicate {kind} identifier {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("unreadable archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("unreadable archive entry: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Default, Debug, Clone)]
pub struct ResourceInfo {
    pub href: Option<String>,
    pub files: Vec<String>,
    pub scorm_type: Option<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ManifestSummary {
    pub default_org: Option<String>,
    pub organization_title: Option<String>,
    /// Items without an `identifierref` (modules).
    pub module_items: Vec<String>,
    /// (identifier, identifierref) of launchable items (lessons).
    pub lesson_items: Vec<(String, String)>,
    pub resources: HashMap<String, ResourceInfo>,
}

/// Parses an `imsmanifest.xml` and checks that every item reference resolves to exactly
/// one resource.
pub fn inspect_manifest(xml: &str) -> Result<ManifestSummary, InspectError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut summary = ManifestSummary {
        default_org: None,
        organization_title: None,
        module_items: Vec::new(),
        lesson_items: Vec::new(),
        resources: HashMap::new(),
    };
    let mut resource_ids: Vec<String> = Vec::new();
    let mut current_res: Option<String> = None;
    let mut item_depth = 0usize;
    let mut in_org_title = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                match local_name(&e).as_str() {
                    "organizations" => summary.default_org = get_attr(&e, "default"),
                    "title" if item_depth == 0 && summary.organization_title.is_none() => {
                        in_org_title = true;
                    }
                    "item" => {
                        item_depth += 1;
                        record_item(&e, &mut summary);
                    }
                    "resource" => {
                        current_res = record_resource(&e, &mut summary, &mut resource_ids);
                    }
                    "file" | "dependency" => record_child(&e, current_res.as_deref(), &mut summary),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => match local_name(&e).as_str() {
                "item" => record_item(&e, &mut summary),
                "resource" => {
                    record_resource(&e, &mut summary, &mut resource_ids);
                }
                "file" | "dependency" => record_child(&e, current_res.as_deref(), &mut summary),
                _ => {}
            },
            Ok(Event::Text(t)) if in_org_title => {
                let title = t.unescape().map_err(|_| InspectError::Parse("imsmanifest.xml"))?;
                summary.organization_title = Some(title.into_owned());
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.rsplit(':').next().unwrap_or(&name) {
                    "item" => item_depth = item_depth.saturating_sub(1),
                    "resource" => current_res = None,
                    "title" => in_org_title = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(InspectError::Parse("imsmanifest.xml")),
            _ => {}
        }
        buf.clear();
    }

    let mut seen = HashSet::new();
    for id in resource_ids {
        if !seen.insert(id.clone()) {
            return Err(InspectError::Duplicate { kind: "resource", id });
        }
    }
    for (item, resource) in &summary.lesson_items {
        if !summary.resources.contains_key(resource) {
            return Err(InspectError::DanglingRef { item: item.clone(), resource: resource.clone() });
        }
    }
    Ok(summary)
}

fn record_item(e: &BytesStart<'_>, summary: &mut ManifestSummary) {
    let Some(id) = get_attr(e, "identifier") else {
        return;
    };
    match get_attr(e, "identifierref").filter(|r| !r.is_empty()) {
        Some(iref) => summary.lesson_items.push((id, iref)),
        None => summary.module_items.push(id),
    }
}

fn record_resource(
    e: &BytesStart<'_>,
    summary: &mut ManifestSummary,
    ids: &mut Vec<String>,
) -> Option<String> {
    let id = get_attr(e, "identifier")?;
    let info = summary.resources.entry(id.clone()).or_default();
    info.href = get_attr(e, "href");
    info.scorm_type = get_attr(e, "scormType");
    ids.push(id.clone());
    Some(id)
}

fn record_child(e: &BytesStart<'_>, resource: Option<&str>, summary: &mut ManifestSummary) {
    let Some(res) = resource.and_then(|r| summary.resources.get_mut(r)) else {
        return;
    };
    match local_name(e).as_str() {
        "file" => res.files.extend(get_attr(e, "href")),
        _ => res.dependencies.extend(get_attr(e, "identifierref")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub id: String,
    pub activity_type: String,
    pub name: String,
    pub launch: Option<String>,
}

/// Parses a `tincan.xml` and checks that activity ids are unique.
pub fn inspect_tincan(xml: &str) -> Result<Vec<Activity>, InspectError> {
    #[derive(PartialEq)]
    enum Field {
        None,
        Name,
        Launch,
    }

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut activities: Vec<Activity> = Vec::new();
    let mut current: Option<Activity> = None;
    let mut field = Field::None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(&e).as_str() {
                "activity" => {
                    current = Some(Activity {
                        id: get_attr(&e, "id").unwrap_or_default(),
                        activity_type: get_attr(&e, "type").unwrap_or_default(),
                        name: String::new(),
                        launch: None,
                    });
                }
                "name" => field = Field::Name,
                "launch" => field = Field::Launch,
                _ => {}
            },
            Ok(Event::Text(t)) if field != Field::None => {
                let text = t
                    .unescape()
                    .map_err(|_| InspectError::Parse("tincan.xml"))?
                    .into_owned();
                if let Some(activity) = current.as_mut() {
                    match field {
                        Field::Name => activity.name = text,
                        Field::Launch => activity.launch = Some(text),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.rsplit(':').next().unwrap_or(&name) {
                    "activity" => activities.extend(current.take()),
                    "name" | "launch" => field = Field::None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(InspectError::Parse("tincan.xml")),
            _ => {}
        }
        buf.clear();
    }

    let mut seen = HashSet::new();
    for activity in &activities {
        if activity.id.is_empty() {
            return Err(InspectError::Parse("tincan.xml"));
        }
        if !seen.insert(activity.id.as_str()) {
            return Err(InspectError::Duplicate { kind: "activity", id: activity.id.clone() });
        }
    }
    Ok(activities)
}

/// Reads every file entry of a zip into memory, keyed by path. Directory entries are
/// skipped.
pub fn read_archive(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, InspectError> {
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut entries = BTreeMap::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut body = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut body)?;
        entries.insert(file.name().to_string(), body);
    }
    Ok(entries)
}

// ------------- helpers -------------

fn local_name(tag: &BytesStart<'_>) -> String {
    let full = String::from_utf8_lossy(tag.name().as_ref()).to_string();
    full.rsplit(':').next().unwrap_or(&full).to_string()
}

fn get_attr(e: &BytesStart<'_>, key_local: &str) -> Option<String> {
    for a in e.attributes().flatten() {
        let key = std::str::from_utf8(a.key.as_ref()).unwrap_or_default();
        let key = key.rsplit(':').next().unwrap_or(key);
        if key == key_local {
            return Some(a.unescape_value().ok()?.into_owned());
        }
    }
    None
}
