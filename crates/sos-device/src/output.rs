//! Terminal output for the device console and the dispatcher view

use colored::*;
use sos_core::{ControllerSnapshot, DeviceEvent};
use sos_types::Stage;

/// Stage name coloured by severity
pub fn stage_label(stage: Stage) -> ColoredString {
    match stage {
        Stage::Alert => stage.as_str().blue(),
        Stage::Risk => stage.as_str().yellow().bold(),
        Stage::Proof => stage.as_str().red().bold(),
        Stage::Safe => stage.as_str().green(),
    }
}

/// Console line for a controller event, `None` for events not worth a line
pub fn render_event(event: &DeviceEvent) -> Option<String> {
    match event {
        DeviceEvent::StageChanged { from, to } => Some(format!(
            "{} {} -> {} ({})",
            "●".bold(),
            stage_label(*from),
            stage_label(*to),
            to.label()
        )),
        DeviceEvent::Notice(notice) if notice.requires_ack => Some(format!(
            "{} {} (press enter to acknowledge)",
            "!!".red().bold(),
            notice.message
        )),
        DeviceEvent::Notice(notice) => Some(format!("{} {}", "ℹ".blue(), notice.message)),
        DeviceEvent::RecordingTick { remaining_secs } => {
            Some(format!("{} recording... {}s", "●".red(), remaining_secs))
        }
        DeviceEvent::DeadManTick { remaining_secs }
            if *remaining_secs <= 10 || remaining_secs % 60 == 0 =>
        {
            Some(format!("{} check-in due in {}s", "⏱".yellow(), remaining_secs))
        }
        DeviceEvent::DeadManTick { .. } => None,
        DeviceEvent::DeadManTriggered => Some(format!(
            "{} no check-in received, escalating",
            "⏱".red().bold()
        )),
        DeviceEvent::StationAssigned { station } => {
            Some(format!("{} nearest station: {}", "⌂".cyan(), station))
        }
        DeviceEvent::AddressUpdated { address } => {
            Some(format!("{} {}", "⌖".cyan(), address))
        }
        DeviceEvent::EvidenceDelivered { bytes } => Some(format!(
            "{} evidence sent ({} bytes)",
            "✓".green(),
            bytes
        )),
        DeviceEvent::GuardianContact { name, phone, uri } => Some(format!(
            "{} calling {} {}",
            "☎".green(),
            guardian_label(name.as_deref(), phone),
            uri.dimmed()
        )),
        DeviceEvent::GuardianMessage { name, phone, uri } => Some(format!(
            "{} texting {} {}",
            "✉".green(),
            guardian_label(name.as_deref(), phone),
            uri.dimmed()
        )),
        DeviceEvent::NearbyMap { place, url } => {
            Some(format!("{} {} near you: {}", "⌖".cyan(), place, url))
        }
        DeviceEvent::LocationShared { url } => {
            Some(format!("{} your location: {}", "⌖".cyan(), url))
        }
        DeviceEvent::EmergencyCall { number, uri } => Some(format!(
            "{} calling emergency services {} {}",
            "☎".red().bold(),
            number,
            uri.dimmed()
        )),
    }
}

fn guardian_label(name: Option<&str>, phone: &str) -> String {
    match name {
        Some(name) => format!("{} ({})", name, phone),
        None => format!("guardian at {}", phone),
    }
}

/// Print a snapshot of the controller
pub fn print_snapshot(snapshot: &ControllerSnapshot) {
    println!("{}", "Device status".bold());
    println!("  Stage:     {}", stage_label(snapshot.stage));
    match snapshot.last_fix {
        Some(fix) => println!("  Position:  {:.5}, {:.5}", fix.lat, fix.lng),
        None => println!("  Position:  {}", "waiting for fix".dimmed()),
    }
    println!(
        "  Station:   {}",
        snapshot.station.as_deref().unwrap_or("-")
    );
    println!("  Address:   {}", snapshot.address.display());
    if let Some(remaining) = snapshot.recording_remaining_secs {
        println!("  Recording: {}s left", remaining);
    }
    if snapshot.dead_man_active {
        println!("  Check-in:  due in {}s", snapshot.dead_man_remaining_secs);
    }
}

/// Print an informational message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}
