//! Reads compiled code out of jar archives into a typed class table.

use crate::model::{ClassEntry, CodeUnit};
use crate::merge::classes::{is_service_file, merge_service_lines};
use ristretto_classfile::ClassFile;
use std::io::{Cursor, Read, Seek};
use zip::ZipArchive;

const CLASS_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Jar entries that describe the jar itself and never survive a merge.
pub(crate) fn is_dropped_entry(name: &str) -> bool {
    if name.ends_with("module-info.class") || name == "META-INF/MANIFEST.MF" {
        return true;
    }
    if let Some(file) = name.strip_prefix("META-INF/") {
        if !file.contains('/') {
            let upper = file.to_ascii_uppercase();
            return upper.ends_with(".SF") || upper.ends_with(".RSA") || upper.ends_with(".DSA");
        }
    }
    false
}

/// Parses the class file and returns its internal name (`com/acme/Util`).
pub(crate) fn declared_class_name(bytes: &[u8]) -> Result<String, String> {
    if bytes.len() < 4 || bytes[..4] != CLASS_MAGIC {
        return Err("missing class file magic".to_string());
    }
    let class = ClassFile::from_bytes(&mut Cursor::new(bytes.to_vec()))
        .map_err(|e| format!("malformed class file: {e:?}"))?;
    let name = class
        .class_name()
        .map_err(|e| format!("unreadable class name: {e:?}"))?;
    Ok(name.to_string())
}

/// Adds every class and Java resource of `archive` to `code`.
///
/// `origin` names the jar inside its artifact for diagnostics. Duplicates
/// within one artifact must be identical (service files are unioned).
pub(crate) fn read_jar<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    origin: &str,
    code: &mut CodeUnit,
) -> Result<(), String> {
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("{origin}: unreadable entry #{i}: {e}"))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if entry.enclosed_name().is_none() {
            return Err(format!("{origin}: entry '{name}' escapes the archive root"));
        }
        if is_dropped_entry(&name) {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| format!("{origin}: cannot read '{name}': {e}"))?;

        let is_class = name.ends_with(".class") && !name.starts_with("META-INF/");
        if is_class {
            add_class(code, origin, &name, bytes)?;
        } else {
            add_java_resource(code, origin, name, bytes)?;
        }
    }
    Ok(())
}

fn add_class(code: &mut CodeUnit, origin: &str, name: &str, bytes: Vec<u8>) -> Result<(), String> {
    let declared =
        declared_class_name(&bytes).map_err(|e| format!("{origin}: {name}: {e}"))?;
    let expected = name.trim_end_matches(".class");
    if declared != expected {
        return Err(format!(
            "{origin}: entry '{name}' declares class '{declared}'"
        ));
    }

    let fqn = declared.replace('/', ".");
    if let Some(existing) = code.classes.get(&fqn) {
        if existing.bytes != bytes {
            return Err(format!(
                "type {fqn} is defined differently in {} and {origin}",
                existing.origin
            ));
        }
        return Ok(());
    }
    code.classes.insert(
        fqn.clone(),
        ClassEntry {
            fqn,
            bytes,
            origin: origin.to_string(),
        },
    );
    Ok(())
}

fn add_java_resource(
    code: &mut CodeUnit,
    origin: &str,
    name: String,
    bytes: Vec<u8>,
) -> Result<(), String> {
    match code.java_resources.get_mut(&name) {
        Some(existing) if is_service_file(&name) => {
            *existing = merge_service_lines(existing, &bytes);
        }
        Some(existing) if *existing != bytes => {
            return Err(format!(
                "{origin}: java resource '{name}' is shipped twice with different content"
            ));
        }
        Some(_) => {}
        None => {
            code.java_resources.insert(name, bytes);
        }
    }
    Ok(())
}
