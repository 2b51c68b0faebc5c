use locator_controller::{
    geometry::JogDirection,
    input::{Key, KeyEvent},
    session::{Action, Mode},
};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("unknown command {0:?}, try help")]
    Unknown(String),
    #[error("{command} expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("{0:?} is not a number")]
    InvalidNumber(String),
    #[error("unknown mode {0:?}, use locator or path")]
    UnknownMode(String),
}

type Result<T> = std::result::Result<T, ParseError>;

/// One line typed at the console
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch(Action),
    /// Run the action behind a control row
    Press(String),
    Code,
    Controls,
    Status,
    Save(Option<String>),
    Help,
    Quit,
}

pub const HELP: &str = "\
w a s d            jog back, left, forward, right
up down            jog z
step <mm>          select jog step
goto <x> <y> <z>   absolute move, - keeps an axis
mode locator|path  switch between resource locator and path teacher
tip <rack>         pick up or drop the reference tip of a rack
teach <resource>   commit a resource location at the tip
pick <plate>       pick up a plate
waypoint           add the current position as intermediate point
remove <index>     remove an intermediate point
put <site>         release the plate on a carrier site
put-here           release the plate at the current position
code               show the move_plate call for the current transfer
commit             print and clear the current transfer
controls           list controls, press <id> runs one
status             show mode, held item and position
save [path]        write the layout
quit";

/// Empty lines parse to `None`
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let name = match words.next() {
        Some(name) => name.to_lowercase(),
        None => return Ok(None),
    };
    let rest: Vec<&str> = words.collect();

    let command = match name.as_str() {
        "w" => jog(KeyEvent::new(Key::W).direction()),
        "a" => jog(KeyEvent::new(Key::A).direction()),
        "s" => jog(KeyEvent::new(Key::S).direction()),
        "d" => jog(KeyEvent::new(Key::D).direction()),
        "up" => jog(KeyEvent::with_shift(Key::Up).direction()),
        "down" => jog(KeyEvent::with_shift(Key::Down).direction()),
        "step" => {
            let step = argument(&rest, "step", "a step size in mm")?;
            Command::Dispatch(Action::SetStep(number(step)?))
        }
        "goto" => {
            if rest.len() != 3 {
                return Err(ParseError::MissingArgument {
                    command: "goto",
                    expected: "three values, - to keep an axis",
                });
            }
            Command::Dispatch(Action::GoTo {
                x: optional_number(rest[0])?,
                y: optional_number(rest[1])?,
                z: optional_number(rest[2])?,
            })
        }
        "mode" => {
            let mode = match argument(&rest, "mode", "locator or path")? {
                "locator" => Mode::ResourceLocator,
                "path" => Mode::PathTeacher,
                other => return Err(ParseError::UnknownMode(other.to_owned())),
            };
            Command::Dispatch(Action::SwitchMode(mode))
        }
        "tip" => {
            let rack = argument(&rest, "tip", "a tip rack name")?;
            Command::Dispatch(Action::ToggleTip(rack.to_owned()))
        }
        "teach" => {
            let resource = argument(&rest, "teach", "a resource name")?;
            Command::Dispatch(Action::Teach(resource.to_owned()))
        }
        "pick" => {
            let plate = argument(&rest, "pick", "a plate name")?;
            Command::Dispatch(Action::PickUpPlate(plate.to_owned()))
        }
        "waypoint" => Command::Dispatch(Action::AddWaypoint),
        "remove" => {
            let index = argument(&rest, "remove", "a point index")?;
            let index = index
                .parse()
                .map_err(|_| ParseError::InvalidNumber(index.to_owned()))?;
            Command::Dispatch(Action::RemoveWaypoint(index))
        }
        "put" => {
            let site = argument(&rest, "put", "a carrier site name")?;
            Command::Dispatch(Action::ReleaseAtSite(site.to_owned()))
        }
        "put-here" => Command::Dispatch(Action::ReleaseHere),
        "commit" => Command::Dispatch(Action::CommitTransfer),
        "press" => Command::Press(argument(&rest, "press", "a control id")?.to_owned()),
        "code" => Command::Code,
        "controls" => Command::Controls,
        "status" => Command::Status,
        "save" => Command::Save(rest.first().map(|path| path.to_string())),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Err(ParseError::Unknown(name)),
    };
    Ok(Some(command))
}

fn jog(direction: JogDirection) -> Command {
    Command::Dispatch(Action::Jog(direction))
}

fn argument<'a>(
    rest: &[&'a str],
    command: &'static str,
    expected: &'static str,
) -> Result<&'a str> {
    rest.first()
        .copied()
        .ok_or(ParseError::MissingArgument { command, expected })
}

fn number(text: &str) -> Result<f64> {
    text.parse()
        .map_err(|_| ParseError::InvalidNumber(text.to_owned()))
}

fn optional_number(text: &str) -> Result<Option<f64>> {
    if text == "-" {
        Ok(None)
    } else {
        number(text).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_is_nothing() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn wasd_jogs_in_plane() {
        assert_eq!(
            parse("w"),
            Ok(Some(Command::Dispatch(Action::Jog(JogDirection::Back))))
        );
        assert_eq!(
            parse("A"),
            Ok(Some(Command::Dispatch(Action::Jog(JogDirection::Left))))
        );
        assert_eq!(
            parse("down"),
            Ok(Some(Command::Dispatch(Action::Jog(JogDirection::Down))))
        );
    }

    #[test]
    fn goto_keeps_dashed_axes() {
        assert_eq!(
            parse("goto 100 - 25.5"),
            Ok(Some(Command::Dispatch(Action::GoTo {
                x: Some(100.0),
                y: None,
                z: Some(25.5)
            })))
        );
        assert!(matches!(
            parse("goto 1 2"),
            Err(ParseError::MissingArgument { command: "goto", .. })
        ));
        assert_eq!(
            parse("goto 1 two 3"),
            Err(ParseError::InvalidNumber("two".to_owned()))
        );
    }

    #[test]
    fn names_are_passed_through() {
        assert_eq!(
            parse("put site_2"),
            Ok(Some(Command::Dispatch(Action::ReleaseAtSite(
                "site_2".to_owned()
            ))))
        );
        assert_eq!(
            parse("tip tips_a"),
            Ok(Some(Command::Dispatch(Action::ToggleTip("tips_a".to_owned()))))
        );
        assert_eq!(
            parse("press pick:source_plate"),
            Ok(Some(Command::Press("pick:source_plate".to_owned())))
        );
    }

    #[test]
    fn mode_names() {
        assert_eq!(
            parse("mode path"),
            Ok(Some(Command::Dispatch(Action::SwitchMode(Mode::PathTeacher))))
        );
        assert_eq!(
            parse("mode gripper"),
            Err(ParseError::UnknownMode("gripper".to_owned()))
        );
    }

    #[test]
    fn save_path_is_optional() {
        assert_eq!(parse("save"), Ok(Some(Command::Save(None))));
        assert_eq!(
            parse("save out.json"),
            Ok(Some(Command::Save(Some("out.json".to_owned()))))
        );
    }

    #[test]
    fn unknown_command() {
        assert_eq!(parse("fly"), Err(ParseError::Unknown("fly".to_owned())));
        assert!(matches!(
            parse("step"),
            Err(ParseError::MissingArgument { command: "step", .. })
        ));
    }
}
