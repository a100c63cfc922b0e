//! List numbering management for DOCX export

use docx_rs::*;

/// The kind of numbered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Ordered,
    Bullet,
}

/// One numbering definition, created for one list instance.
#[derive(Debug, Clone)]
struct Definition {
    kind: ListKind,
    instance: u32,
    id: usize,
    max_level: usize,
}

/// List numbering management for DOCX
///
/// Numbering ids are handed out lazily, one per list instance, in the order
/// the instances are first seen. Each definition only carries the levels
/// its instance actually uses.
#[derive(Clone, Debug)]
pub struct DocxNumbering {
    definitions: Vec<Definition>,
    next_id: usize,
}

impl DocxNumbering {
    /// Create a new numbering manager
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            next_id: 1,
        }
    }

    /// The indentation of a list paragraph at the given level, in twips.
    pub fn indent_of(level: u32) -> i32 {
        720 * (level as i32 + 1)
    }

    /// Create a list level with the specified parameters
    fn create_list_level(id: usize, format: &str, text: &str, is_bullet: bool) -> Level {
        let hanging_indent = if is_bullet { 360 } else { 420 };

        Level::new(
            id,
            Start::new(1),
            NumberFormat::new(format),
            LevelText::new(text),
            LevelJc::new("left"),
        )
        .indent(
            Some(Self::indent_of(id as u32)),
            Some(SpecialIndentType::Hanging(hanging_indent)),
            None,
            None,
        )
    }

    /// The numbering id of an ordered list instance, used down to `level`.
    pub fn ordered(&mut self, instance: u32, level: u32) -> usize {
        self.numbering_id(ListKind::Ordered, instance, level)
    }

    /// The numbering id of a bullet list instance, used down to `level`.
    pub fn bullet(&mut self, instance: u32, level: u32) -> usize {
        self.numbering_id(ListKind::Bullet, instance, level)
    }

    fn numbering_id(&mut self, kind: ListKind, instance: u32, level: u32) -> usize {
        let level = level as usize;
        let existing = self
            .definitions
            .iter_mut()
            .find(|def| def.kind == kind && def.instance == instance);
        if let Some(def) = existing {
            def.max_level = def.max_level.max(level);
            return def.id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.definitions.push(Definition {
            kind,
            instance,
            id,
            max_level: level,
        });
        id
    }

    /// Adds every definition handed out so far to the document.
    pub fn finish(self, mut docx: Docx) -> Docx {
        for def in self.definitions {
            let mut abstract_numbering = AbstractNumbering::new(def.id);
            for level in 0..=def.max_level {
                let definition = match def.kind {
                    ListKind::Ordered => Self::ordered_level(level),
                    ListKind::Bullet => Self::bullet_level(level),
                };
                abstract_numbering = abstract_numbering.add_level(definition);
            }
            docx = docx
                .add_abstract_numbering(abstract_numbering)
                .add_numbering(Numbering::new(def.id, def.id));
        }
        docx
    }

    fn ordered_level(level: usize) -> Level {
        let number_format = match level % 3 {
            0 => "decimal",
            1 => "lowerLetter",
            _ => "lowerRoman",
        };
        let level_text = format!("%{}.", level + 1);

        let ordered_level = Self::create_list_level(level, number_format, &level_text, false);
        if level > 0 {
            ordered_level.level_restart(0_u32)
        } else {
            ordered_level
        }
    }

    fn bullet_level(level: usize) -> Level {
        let bullet_text = match level % 3 {
            0 => "•",
            1 => "○",
            _ => "▪",
        };
        Self::create_list_level(level, "bullet", bullet_text, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_first_use() {
        let mut numbering = DocxNumbering::new();
        assert_eq!(numbering.bullet(1, 0), 1);
        assert_eq!(numbering.ordered(1, 0), 2);
        assert_eq!(numbering.bullet(1, 2), 1);
        assert_eq!(numbering.bullet(2, 0), 3);

        let levels: Vec<_> = numbering
            .definitions
            .iter()
            .map(|def| (def.id, def.max_level))
            .collect();
        assert_eq!(levels, [(1, 2), (2, 0), (3, 0)]);
    }

    #[test]
    fn indentation_grows_per_level() {
        assert_eq!(DocxNumbering::indent_of(0), 720);
        assert_eq!(DocxNumbering::indent_of(2), 2160);
    }
}
