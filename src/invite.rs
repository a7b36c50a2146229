//! Calendar-invite (ICS) body generation.

use chrono::Utc;
use icalendar::{Calendar, Component, Event, EventLike, Property};

use crate::types::CachedOutage;

/// Renders one cached outage as a METHOD:REQUEST calendar. The entry's
/// sequence travels as SEQUENCE and its uid as UID, so a mail client treats a
/// re-sent outage as an update to the existing event instead of a duplicate.
pub fn invite_body(entry: &CachedOutage, organizer_email: &str) -> String {
    let mut cal = Calendar::new();
    cal.append_property(Property::new("METHOD", "REQUEST"));

    let mut event = Event::new();
    event.uid(&entry.uid);
    event.summary(&entry.summary());
    event.description(&entry.description());
    event.location(&entry.address);
    event.starts(entry.start);
    event.ends(entry.end);

    let dtstamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    event.add_property("DTSTAMP", &dtstamp);
    event.add_property("SEQUENCE", entry.sequence.to_string());
    event.add_property("STATUS", "CONFIRMED");
    event.add_property("TRANSP", "OPAQUE");
    event.add_property("PRIORITY", "5");

    let mut organizer = Property::new("ORGANIZER", format!("mailto:{organizer_email}"));
    organizer.add_parameter("CN", "Barghman");
    event.append_property(organizer);

    for recipient in &entry.recipients {
        let mut attendee = Property::new("ATTENDEE", format!("mailto:{recipient}"));
        attendee.add_parameter("ROLE", "REQ-PARTICIPANT");
        attendee.add_parameter("PARTSTAT", "NEEDS-ACTION");
        attendee.add_parameter("RSVP", "TRUE");
        event.append_multi_property(attendee);
    }

    cal.push(event.done());
    cal.done().to_string()
}
