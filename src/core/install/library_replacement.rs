// ─── Library Replacement ───
// Swaps library versions known to break on current runtimes for fixed ones
// published on Maven Central.

use tracing::debug;

use crate::core::maven::{MavenArtifact, MAVEN_CENTRAL};
use crate::core::version::{LibDownloadArtifact, LibraryDownloads, LibraryEntry};

struct Replacement {
    prefix: &'static str,
    coordinate: &'static str,
    sha1: &'static str,
    applies: fn((u32, u32)) -> bool,
}

fn below_5_13(version: (u32, u32)) -> bool {
    version < (5, 13)
}

fn is_6_2(version: (u32, u32)) -> bool {
    version == (6, 2)
}

fn below_5((major, _): (u32, u32)) -> bool {
    major < 5
}

const REPLACEMENTS: &[Replacement] = &[
    Replacement {
        prefix: "net.java.dev.jna:jna:",
        coordinate: "net.java.dev.jna:jna:5.13.0",
        sha1: "1200e7ebeedbe0d10062093f32925a912020e747",
        applies: below_5_13,
    },
    Replacement {
        prefix: "com.github.oshi:oshi-core:",
        coordinate: "com.github.oshi:oshi-core:6.3.0",
        sha1: "9e98cf55be371cafdb9c70c35d04ec2a8c2b42ac",
        applies: is_6_2,
    },
    Replacement {
        prefix: "org.ow2.asm:asm-all:",
        coordinate: "org.ow2.asm:asm-all:5.0.4",
        sha1: "e6244859997b3d4237a552669279780876228909",
        applies: below_5,
    },
];

/// Rewrite `library` in place if a replacement applies. Returns whether it did.
pub fn apply_replacement(library: &mut LibraryEntry) -> bool {
    let Some(replacement) = REPLACEMENTS
        .iter()
        .find(|r| library.name.starts_with(r.prefix))
    else {
        return false;
    };
    let Ok(current) = MavenArtifact::parse(&library.name) else {
        return false;
    };
    if !(replacement.applies)(current.major_minor()) {
        return false;
    }
    let Ok(target) = MavenArtifact::parse(replacement.coordinate) else {
        return false;
    };

    debug!(
        "Library {} has been changed to version {}",
        library.name, target.version
    );
    library.name = replacement.coordinate.to_string();
    let downloads = library.downloads.get_or_insert_with(LibraryDownloads::default);
    let artifact = downloads.artifact.get_or_insert_with(LibDownloadArtifact::default);
    artifact.path = Some(target.relative_path());
    artifact.sha1 = Some(replacement.sha1.to_string());
    artifact.url = Some(target.url(MAVEN_CENTRAL));
    // Size of the replaced file is unknown.
    artifact.size = 0;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library(name: &str) -> LibraryEntry {
        serde_json::from_value(serde_json::json!({ "name": name })).unwrap()
    }

    #[test]
    fn old_jna_is_upgraded() {
        let mut lib = library("net.java.dev.jna:jna:4.4.0");
        assert!(apply_replacement(&mut lib));
        assert_eq!(lib.name, "net.java.dev.jna:jna:5.13.0");

        let artifact = lib.downloads.unwrap().artifact.unwrap();
        assert_eq!(artifact.path.unwrap(), "net/java/dev/jna/jna/5.13.0/jna-5.13.0.jar");
        assert_eq!(
            artifact.url.unwrap(),
            "https://repo1.maven.org/maven2/net/java/dev/jna/jna/5.13.0/jna-5.13.0.jar"
        );
        assert_eq!(artifact.sha1.unwrap(), "1200e7ebeedbe0d10062093f32925a912020e747");
    }

    #[test]
    fn recent_jna_is_kept() {
        for name in ["net.java.dev.jna:jna:5.13.0", "net.java.dev.jna:jna:5.14.0", "net.java.dev.jna:jna:6.0.1"] {
            let mut lib = library(name);
            assert!(!apply_replacement(&mut lib), "{name}");
            assert_eq!(lib.name, name);
        }
    }

    #[test]
    fn only_oshi_6_2_is_replaced() {
        let mut lib = library("com.github.oshi:oshi-core:6.2.2");
        assert!(apply_replacement(&mut lib));
        assert_eq!(lib.name, "com.github.oshi:oshi-core:6.3.0");

        assert!(!apply_replacement(&mut library("com.github.oshi:oshi-core:6.4.0")));
        assert!(!apply_replacement(&mut library("com.github.oshi:oshi-core:5.8.5")));
    }

    #[test]
    fn asm_all_below_5_is_replaced() {
        let mut lib = library("org.ow2.asm:asm-all:4.1");
        assert!(apply_replacement(&mut lib));
        assert_eq!(
            lib.artifact_path().unwrap(),
            "org/ow2/asm/asm-all/5.0.4/asm-all-5.0.4.jar"
        );
        assert!(!apply_replacement(&mut library("org.ow2.asm:asm-all:5.2")));
    }

    #[test]
    fn unrelated_libraries_are_untouched() {
        let mut lib = library("com.mojang:brigadier:1.0.18");
        assert!(!apply_replacement(&mut lib));
        assert!(lib.downloads.is_none());
    }
}
