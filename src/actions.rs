use anyhow::{Result, anyhow};
use log::{info, warn};

/// Virtual keyboard used to execute `key:` bindings. Falls back to a
/// NO-OP sink when uinput is unavailable so the pipeline keeps running.
pub struct UinputSink {
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create()?;
            return Ok(Self {
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self { linux: None })
        }
    }

    pub fn noop() -> Self {
        Self { linux: None }
    }

    /// Send a chord like "CTRL+SHIFT+TAB" or a single "PLAYPAUSE".
    pub fn key_chord(&mut self, chord: &str) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            let parts: Vec<_> = chord
                .split('+')
                .map(|s| s.trim().to_ascii_uppercase())
                .collect();
            let mut keys = Vec::with_capacity(parts.len());
            for p in parts {
                keys.push(map_key(&p)?);
            }
            // press in order
            for k in &keys {
                dev.key_send(*k, 1)?;
            }
            dev.sync()?;
            // release in reverse
            for k in keys.iter().rev() {
                dev.key_send(*k, 0)?;
            }
            dev.sync()?;
        }
        Ok(())
    }
}

/// Spawn a `cmd:` binding without waiting on it; gated upstream by
/// `meta.allow_commands`.
pub fn run_command(cmdline: &str) -> Result<()> {
    let child = std::process::Command::new("sh")
        .arg("-c")
        .arg(cmdline)
        .spawn()?;
    info!("spawned command (pid={}): {cmdline}", child.id());
    Ok(())
}

#[cfg(target_os = "linux")]
fn map_key(tok: &str) -> Result<uinput::event::Keyboard> {
    use uinput::event::Keyboard;
    use uinput::event::keyboard::{Key as K, Misc as M};

    let k = match tok {
        "CTRL" | "CONTROL" => Keyboard::Key(K::LeftControl),
        "ALT" => Keyboard::Key(K::LeftAlt),
        "SHIFT" => Keyboard::Key(K::LeftShift),
        "SUPER" | "META" | "WIN" => Keyboard::Key(K::LeftMeta),

        "TAB" => Keyboard::Key(K::Tab),
        "ENTER" | "RETURN" => Keyboard::Key(K::Enter),
        "ESC" | "ESCAPE" => Keyboard::Key(K::Esc),
        "SPACE" => Keyboard::Key(K::Space),
        "BACKSPACE" => Keyboard::Key(K::BackSpace),
        "MINUS" | "-" => Keyboard::Key(K::Minus),
        "EQUAL" | "=" => Keyboard::Key(K::Equal),

        "LEFT" => Keyboard::Key(K::Left),
        "RIGHT" => Keyboard::Key(K::Right),
        "UP" => Keyboard::Key(K::Up),
        "DOWN" => Keyboard::Key(K::Down),
        "HOME" => Keyboard::Key(K::Home),
        "END" => Keyboard::Key(K::End),
        "PAGEUP" => Keyboard::Key(K::PageUp),
        "PAGEDOWN" => Keyboard::Key(K::PageDown),

        "A" => Keyboard::Key(K::A),
        "B" => Keyboard::Key(K::B),
        "C" => Keyboard::Key(K::C),
        "D" => Keyboard::Key(K::D),
        "E" => Keyboard::Key(K::E),
        "F" => Keyboard::Key(K::F),
        "G" => Keyboard::Key(K::G),
        "H" => Keyboard::Key(K::H),
        "I" => Keyboard::Key(K::I),
        "J" => Keyboard::Key(K::J),
        "K" => Keyboard::Key(K::K),
        "L" => Keyboard::Key(K::L),
        "M" => Keyboard::Key(K::M),
        "N" => Keyboard::Key(K::N),
        "O" => Keyboard::Key(K::O),
        "P" => Keyboard::Key(K::P),
        "Q" => Keyboard::Key(K::Q),
        "R" => Keyboard::Key(K::R),
        "S" => Keyboard::Key(K::S),
        "T" => Keyboard::Key(K::T),
        "U" => Keyboard::Key(K::U),
        "V" => Keyboard::Key(K::V),
        "W" => Keyboard::Key(K::W),
        "X" => Keyboard::Key(K::X),
        "Y" => Keyboard::Key(K::Y),
        "Z" => Keyboard::Key(K::Z),

        "0" => Keyboard::Key(K::_0),
        "1" => Keyboard::Key(K::_1),
        "2" => Keyboard::Key(K::_2),
        "3" => Keyboard::Key(K::_3),
        "4" => Keyboard::Key(K::_4),
        "5" => Keyboard::Key(K::_5),
        "6" => Keyboard::Key(K::_6),
        "7" => Keyboard::Key(K::_7),
        "8" => Keyboard::Key(K::_8),
        "9" => Keyboard::Key(K::_9),

        "F1" => Keyboard::Key(K::F1),
        "F2" => Keyboard::Key(K::F2),
        "F3" => Keyboard::Key(K::F3),
        "F4" => Keyboard::Key(K::F4),
        "F5" => Keyboard::Key(K::F5),
        "F6" => Keyboard::Key(K::F6),
        "F7" => Keyboard::Key(K::F7),
        "F8" => Keyboard::Key(K::F8),
        "F9" => Keyboard::Key(K::F9),
        "F10" => Keyboard::Key(K::F10),

        "MUTE" => Keyboard::Misc(M::Mute),
        "VOLUMEUP" => Keyboard::Misc(M::VolumeUp),
        "VOLUMEDOWN" => Keyboard::Misc(M::VolumeDown),
        "PLAYPAUSE" => Keyboard::Misc(M::PlayPause),
        "NEXTSONG" => Keyboard::Misc(M::NextSong),
        "PREVIOUSSONG" => Keyboard::Misc(M::PreviousSong),

        other => return Err(anyhow!("unsupported key token: {other}")),
    };
    Ok(k)
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create() -> Result<Self> {
        use uinput::event::Keyboard;

        // register the whole keyboard map so profiles can bind any chord
        let dev = uinput::default()?
            .name("Handctl Virtual Input")?
            .event(Keyboard::All)?
            .create()?;

        info!("uinput: created virtual keyboard");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: uinput::event::Keyboard, val: i32) -> Result<()> {
        self.dev.send(key, val)?;
        Ok(())
    }
}
