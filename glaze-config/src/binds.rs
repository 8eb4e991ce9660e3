use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use knuffel::errors::DecodeError;
use miette::miette;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smithay::input::keyboard::keysyms::KEY_NoSymbol;
use smithay::input::keyboard::xkb::{keysym_from_name, keysym_get_name, KEYSYM_CASE_INSENSITIVE};
use smithay::input::keyboard::Keysym;

use crate::utils::{expect_only_children, MergeWith};

/// Global accelerators, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binds(pub Vec<Bind>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bind {
    pub key: Key,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub keysym: Keysym,
    pub modifiers: Modifiers,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Modifiers : u8 {
        const CTRL = 1;
        const SHIFT = 1 << 1;
        const ALT = 1 << 2;
        const SUPER = 1 << 3;
    }
}

/// Modifier-only key spec such as `Ctrl+Super`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierKeys(pub Modifiers);

#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    ZoomIn,
    ZoomOut,
    ZoomActualSize,
    MoveZoomLeft,
    MoveZoomRight,
    MoveZoomUp,
    MoveZoomDown,
    MoveMouseToFocus,
    MoveMouseToCenter,
    ToggleOverview,
    ToggleDesktopGrid,
}

/// Part of the config that rebinds actions.
///
/// Every action that appears here loses its default keys.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BindsPart(pub Vec<Bind>);

impl Default for Binds {
    fn default() -> Self {
        let bind = |key: &str, action| Bind {
            // Default keys are known to parse.
            key: key.parse().unwrap_or(Key {
                keysym: Keysym::from(KEY_NoSymbol),
                modifiers: Modifiers::empty(),
            }),
            action,
        };

        Self(vec![
            bind("Super+Plus", Action::ZoomIn),
            bind("Super+Equal", Action::ZoomIn),
            bind("Super+Minus", Action::ZoomOut),
            bind("Super+0", Action::ZoomActualSize),
            bind("Super+F5", Action::MoveMouseToFocus),
            bind("Super+F6", Action::MoveMouseToCenter),
            bind("Super+F8", Action::ToggleDesktopGrid),
            bind("Super+W", Action::ToggleOverview),
        ])
    }
}

impl MergeWith<BindsPart> for Binds {
    fn merge_with(&mut self, part: &BindsPart) {
        let rebound: HashSet<Action> = part.0.iter().map(|bind| bind.action).collect();
        self.0.retain(|bind| !rebound.contains(&bind.action));
        for bind in &part.0 {
            self.0.retain(|existing| existing.key != bind.key);
            self.0.push(bind.clone());
        }
    }
}

impl Binds {
    pub fn find(&self, keysym: Keysym, modifiers: Modifiers) -> Option<&Bind> {
        self.0
            .iter()
            .find(|bind| bind.key.keysym == keysym && bind.key.modifiers == modifiers)
    }

    pub fn keys_for(&self, action: Action) -> impl Iterator<Item = Key> + '_ {
        self.0
            .iter()
            .filter(move |bind| bind.action == action)
            .map(|bind| bind.key)
    }
}

impl<S> knuffel::Decode<S> for BindsPart
where
    S: knuffel::traits::ErrorSpan,
{
    fn decode_node(
        node: &knuffel::ast::SpannedNode<S>,
        ctx: &mut knuffel::decode::Context<S>,
    ) -> Result<Self, DecodeError<S>> {
        expect_only_children(node, ctx);

        let mut seen_keys = HashSet::new();
        let mut binds = Vec::new();

        for child in node.children() {
            match Bind::decode_node(child, ctx) {
                Err(e) => ctx.emit_error(e),
                Ok(bind) => {
                    if seen_keys.insert(bind.key) {
                        binds.push(bind);
                    } else {
                        ctx.emit_error(DecodeError::unexpected(
                            &child.node_name,
                            "keybind",
                            "duplicate keybind",
                        ));
                    }
                }
            }
        }

        Ok(Self(binds))
    }
}

impl<S> knuffel::Decode<S> for Bind
where
    S: knuffel::traits::ErrorSpan,
{
    fn decode_node(
        node: &knuffel::ast::SpannedNode<S>,
        ctx: &mut knuffel::decode::Context<S>,
    ) -> Result<Self, DecodeError<S>> {
        expect_only_children(node, ctx);

        let key = node
            .node_name
            .parse::<Key>()
            .map_err(|e| DecodeError::conversion(&node.node_name, e.wrap_err("invalid keybind")))?;

        let mut children = node.children();
        let Some(child) = children.next() else {
            return Err(DecodeError::missing(
                node,
                "expected an action for this keybind",
            ));
        };
        for unwanted_child in children {
            ctx.emit_error(DecodeError::unexpected(
                unwanted_child,
                "node",
                "only one action is allowed per keybind",
            ));
        }

        let action = Action::decode_node(child, ctx)?;
        Ok(Self { key, action })
    }
}

impl FromStr for Key {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split('+');
        let key = split.next_back().unwrap_or_default();

        // Allow binding the plus key itself as "Super++".
        let (key, modifiers) = if key.is_empty() && s.ends_with("++") {
            let head = &s[..s.len() - 2];
            ("plus", parse_modifiers(head.split('+'))?)
        } else {
            (key, parse_modifiers(split)?)
        };

        let keysym = keysym_from_name(key, KEYSYM_CASE_INSENSITIVE);
        if keysym.raw() == KEY_NoSymbol {
            return Err(miette!("invalid key: {key}"));
        }

        Ok(Key { keysym, modifiers })
    }
}

fn parse_modifiers<'a>(parts: impl Iterator<Item = &'a str>) -> miette::Result<Modifiers> {
    let mut modifiers = Modifiers::empty();
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.eq_ignore_ascii_case("ctrl") || part.eq_ignore_ascii_case("control") {
            modifiers |= Modifiers::CTRL;
        } else if part.eq_ignore_ascii_case("shift") {
            modifiers |= Modifiers::SHIFT;
        } else if part.eq_ignore_ascii_case("alt") {
            modifiers |= Modifiers::ALT;
        } else if part.eq_ignore_ascii_case("super")
            || part.eq_ignore_ascii_case("win")
            || part.eq_ignore_ascii_case("meta")
        {
            modifiers |= Modifiers::SUPER;
        } else {
            return Err(miette!("invalid modifier: {part}"));
        }
    }
    Ok(modifiers)
}

impl FromStr for ModifierKeys {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_modifiers(s.split('+')).map(Self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, flag) in [
            ("Ctrl", Modifiers::CTRL),
            ("Shift", Modifiers::SHIFT),
            ("Alt", Modifiers::ALT),
            ("Super", Modifiers::SUPER),
        ] {
            if self.modifiers.contains(flag) {
                write!(f, "{name}+")?;
            }
        }
        f.write_str(&keysym_get_name(self.keysym))
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
