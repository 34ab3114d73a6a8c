// ─── Mirror URL Mapping ───
// Rewrites official hosts to their BMCLAPI equivalents.

use serde::{Deserialize, Serialize};

const BMCLAPI_ROOT: &str = "https://bmclapi2.bangbang93.com";
const BMCLAPI_MAVEN: &str = "https://bmclapi2.bangbang93.com/maven";
const BMCLAPI_ASSETS: &str = "https://bmclapi2.bangbang93.com/assets";
const BMCLAPI_LIBRARIES: &str = "https://bmclapi2.bangbang93.com/libraries";
const TENCENT_MAVEN: &str = "https://mirrors.cloud.tencent.com/nexus/repository/maven-public";

/// Which of the two equivalent sources is tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorSourceType {
    #[default]
    OfficialFirst,
    MirrorFirst,
}

/// Official prefix → mirror prefix. First matching prefix wins, so longer
/// prefixes of the same host come first.
const MIRROR_TABLE: &[(&str, &str)] = &[
    (BMCLAPI_ROOT, BMCLAPI_ROOT),
    ("https://launchermeta.mojang.com", BMCLAPI_ROOT),
    ("https://piston-meta.mojang.com", BMCLAPI_ROOT),
    ("https://piston-data.mojang.com", BMCLAPI_ROOT),
    ("https://launcher.mojang.com", BMCLAPI_ROOT),
    ("https://libraries.minecraft.net", BMCLAPI_LIBRARIES),
    ("https://resources.download.minecraft.net", BMCLAPI_ASSETS),
    ("http://files.minecraftforge.net/maven", BMCLAPI_MAVEN),
    ("https://files.minecraftforge.net/maven", BMCLAPI_MAVEN),
    ("https://maven.minecraftforge.net", BMCLAPI_MAVEN),
    (
        "https://maven.neoforged.net/releases/net/neoforged/forge",
        "https://bmclapi2.bangbang93.com/maven/net/neoforged/forge",
    ),
    (
        "https://maven.neoforged.net/releases/net/neoforged/neoforge",
        "https://bmclapi2.bangbang93.com/maven/net/neoforged/neoforge",
    ),
    ("https://meta.fabricmc.net", "https://bmclapi2.bangbang93.com/fabric-meta"),
    ("https://maven.fabricmc.net", BMCLAPI_MAVEN),
    ("https://repo1.maven.org/maven2", TENCENT_MAVEN),
    ("https://repo.maven.apache.org/maven2", TENCENT_MAVEN),
];

/// Mirror counterpart of `url`, if its host is mirrored.
pub fn mirror_url(url: &str) -> Option<String> {
    MIRROR_TABLE
        .iter()
        .find(|(official, _)| url.starts_with(official))
        .map(|(official, mirror)| format!("{}{}", mirror, &url[official.len()..]))
}

/// Candidate URLs for one resource, ordered by `source`.
///
/// Asset objects are numerous and always go official-first to keep load off
/// the mirror. URLs without a mirror yield only themselves.
pub fn map_mirrorable_urls(url: &str, source: MirrorSourceType) -> Vec<String> {
    let Some(mirror) = mirror_url(url) else {
        return vec![url.to_string()];
    };
    if mirror == url {
        return vec![mirror];
    }

    let order = if mirror.starts_with(BMCLAPI_ASSETS) {
        MirrorSourceType::OfficialFirst
    } else {
        source
    };

    match order {
        MirrorSourceType::OfficialFirst => vec![url.to_string(), mirror],
        MirrorSourceType::MirrorFirst => vec![mirror, url.to_string()],
    }
}
