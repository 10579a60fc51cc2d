use meetbot_protocol::MeetingRef;

pub fn execute(url: &str) -> MeetingRef {
	MeetingRef::parse(url)
}
