//! Output formatting for non-interactive search results

use crate::index::types::Entity;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Print entities to stdout, one per line
pub fn print_entities<'a>(
    entities: impl IntoIterator<Item = &'a Entity>,
    color: bool,
    map_instance: &str,
) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);
    write_entities(&mut stdout, entities, map_instance)
}

/// Write `id  name  [attributes]  command` lines
pub fn write_entities<'a, W: WriteColor>(
    out: &mut W,
    entities: impl IntoIterator<Item = &'a Entity>,
    map_instance: &str,
) -> io::Result<()> {
    for entity in entities {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Blue)))?;
        write!(out, "{}", entity.id)?;
        out.reset()?;

        out.set_color(ColorSpec::new().set_bold(true))?;
        write!(out, "  {}", entity.name)?;
        out.reset()?;

        let attributes = entity
            .detail_lines()
            .into_iter()
            .skip(2)
            .filter(|line| line.contains('='))
            .collect::<Vec<_>>();
        if !attributes.is_empty() {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(out, "  [{}]", attributes.join(" "))?;
            out.reset()?;
        }

        if entity.missing_data {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
            write!(out, " *")?;
            out.reset()?;
        }

        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(out, "  {}", entity.relay_command(map_instance))?;
        out.reset()?;
    }
    Ok(())
}

/// Print the count line shown after results
pub fn print_summary(shown: usize, total: usize) -> io::Result<()> {
    let mut stderr = io::stderr();
    if shown < total {
        writeln!(stderr, "{} of {} matches", shown, total)
    } else {
        writeln!(stderr, "{} matches", total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::EntityKind;
    use termcolor::Buffer;

    fn entity() -> Entity {
        Entity {
            kind: EntityKind::Item,
            id: "00000001".to_string(),
            name: "Red Potion".to_string(),
            class: Some("potion".to_string()),
            feature: None,
            slot_name: None,
            icon_path: None,
            tokens: Vec::new(),
            missing_data: true,
        }
    }

    #[test]
    fn test_write_entities_plain() {
        let mut buffer = Buffer::no_color();
        write_entities(&mut buffer, [&entity()], "0").unwrap();

        let text = String::from_utf8(buffer.into_inner()).unwrap();
        assert_eq!(
            text,
            "00000001  Red Potion  [class=potion slot=undefined feature=undefined] *  /item 00000001 1 1\n"
        );
    }

    #[test]
    fn test_write_map_command() {
        let mut map = entity();
        map.kind = EntityKind::Map;
        map.missing_data = false;

        let mut buffer = Buffer::no_color();
        write_entities(&mut buffer, [&map], "2").unwrap();

        let text = String::from_utf8(buffer.into_inner()).unwrap();
        assert!(text.ends_with("/map 00000001 2\n"));
    }
}
