use crate::engine::CandidateSource;
use crate::model::Assignment;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hex: String,
    pub components: Vec<String>,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

fn finish(parts: Vec<String>) -> Fingerprint {
    let hex = sha256_hex(&parts.join("\n"));
    Fingerprint {
        hex,
        components: parts,
    }
}

/// Identifies an assignment, expectations included. Any change to a spec,
/// a mark or an expected value yields a new fingerprint.
pub fn assignment(a: &Assignment) -> anyhow::Result<Fingerprint> {
    let parts = vec![
        format!("assignment={}", a.assignment),
        // field order is fixed by the struct, so this serialization is stable
        format!("body={}", serde_json::to_string(a)?),
        format!("sqlmark_version={}", env!("CARGO_PKG_VERSION")),
    ];
    Ok(finish(parts))
}

/// Identifies what a candidate submitted for the given files. Missing files
/// contribute an explicit marker, so "absent" and "empty" differ.
pub fn candidate_sources(candidate: &dyn CandidateSource, files: &[&str]) -> anyhow::Result<Fingerprint> {
    let mut names: Vec<&str> = files.to_vec();
    names.sort_unstable();
    names.dedup();

    let mut parts = Vec::with_capacity(names.len());
    for name in names {
        match candidate.read(name)? {
            Some(text) => parts.push(format!("{}={}", name, sha256_hex(&text))),
            None => parts.push(format!("{}=<missing>", name)),
        }
    }
    Ok(finish(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::InlineSubmission;

    #[test]
    fn file_order_does_not_matter() -> anyhow::Result<()> {
        let c = InlineSubmission::new("trn01")
            .with_file("fun.txt", "CREATE FUNCTION f() RETURNS INT RETURN 1")
            .with_file("q1.txt", "SELECT 1");
        let a = candidate_sources(&c, &["fun.txt", "q1.txt", "proc.txt"])?;
        let b = candidate_sources(&c, &["proc.txt", "q1.txt", "fun.txt"])?;
        assert_eq!(a, b);
        assert!(a.components.contains(&"proc.txt=<missing>".to_string()));
        Ok(())
    }

    #[test]
    fn content_change_changes_hex() -> anyhow::Result<()> {
        let one = InlineSubmission::new("x").with_file("q1.txt", "SELECT 1");
        let two = InlineSubmission::new("x").with_file("q1.txt", "SELECT 2");
        assert_ne!(
            candidate_sources(&one, &["q1.txt"])?.hex,
            candidate_sources(&two, &["q1.txt"])?.hex
        );
        Ok(())
    }
}
