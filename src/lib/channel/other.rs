// TODO: implement proper check (lsof on macos, CreateFile sharing mode on windows)
pub fn is_port_open(_port_name: &str) -> bool {
    false
}
