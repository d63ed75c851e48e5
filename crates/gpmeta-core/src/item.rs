use serde::{Deserialize, Serialize};

/// Separator used for the albums column of the ledger.
pub const ALBUM_SEPARATOR: char = ';';

/// Metadata recovered for one item page. Every field except `link` may be
/// empty when the page did not expose it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    /// Identity of the item; unique within a ledger
    pub link: String,
    pub filename: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM:SS`, 24-hour local time
    pub time: String,
    pub latitude: String,
    pub longitude: String,
    /// Human readable place name
    pub location: String,
    /// Album names in page order
    pub albums: Vec<String>,
}

impl Item {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            ..Self::default()
        }
    }
}

/// One ledger row exactly as persisted; column order is the file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub link: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub albums: String,
}

impl LedgerRecord {
    pub const HEADER: [&'static str; 8] = [
        "link",
        "filename",
        "date",
        "time",
        "latitude",
        "longitude",
        "location",
        "albums",
    ];
}

impl From<&Item> for LedgerRecord {
    fn from(item: &Item) -> Self {
        let mut albums = String::new();
        for (i, name) in item.albums.iter().enumerate() {
            if i > 0 {
                albums.push(ALBUM_SEPARATOR);
            }
            albums.push_str(name);
        }
        Self {
            link: item.link.clone(),
            filename: item.filename.clone(),
            date: item.date.clone(),
            time: item.time.clone(),
            latitude: item.latitude.clone(),
            longitude: item.longitude.clone(),
            location: item.location.clone(),
            albums,
        }
    }
}

/// The subset of a ledger row the tagging stage needs. Columns the file
/// does not carry come back as `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoRecord {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}
