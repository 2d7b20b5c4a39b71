//! Links handed to the device shell for reaching people and places:
//! calling or texting the guardian, the emergency number, nearby-place map
//! searches and a shareable map pin for the current fix.

use sos_types::Coord;

/// Body of the text message sent to the guardian
pub const GUARDIAN_SMS_BODY: &str = "I NEED HELP! Tracking my location.";

/// Zoom level of nearby-place searches
const SEARCH_ZOOM: u8 = 14;

/// Places the map search can look for around the current fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NearbyPlace {
    Hospitals,
    PoliceStations,
    CrowdedPlaces,
}

impl NearbyPlace {
    /// Search terms sent to the map
    pub fn query(&self) -> &'static str {
        match self {
            NearbyPlace::Hospitals => "hospitals",
            NearbyPlace::PoliceStations => "police station",
            NearbyPlace::CrowdedPlaces => "crowded public places",
        }
    }
}

impl std::fmt::Display for NearbyPlace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.query())
    }
}

/// `tel:` link dialling `number`
pub fn call_uri(number: &str) -> String {
    format!("tel:{}", dial_string(number))
}

/// `sms:` link to `number` prefilled with `body`
pub fn sms_uri(number: &str, body: &str) -> String {
    format!("sms:{}?body={}", dial_string(number), encode_component(body))
}

/// Phone number as typed, minus the spacing people save it with
fn dial_string(number: &str) -> String {
    number.split_whitespace().collect()
}

/// Map search for `place` centred on `at`
pub fn nearby_search_url(place: NearbyPlace, at: Coord) -> String {
    format!(
        "https://www.google.com/maps/search/{}/@{},{},{}z",
        encode_component(place.query()),
        at.lat,
        at.lng,
        SEARCH_ZOOM
    )
}

/// Map pin for `at`, suitable for sharing
pub fn location_url(at: Coord) -> String {
    format!("https://www.google.com/maps?q={},{}", at.lat, at.lng)
}

/// Percent-encode everything outside the URI unreserved set
fn encode_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
