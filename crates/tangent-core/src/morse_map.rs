//! Dash/dot pattern to output symbol table. Dit = '0', dah = '1'.

use crate::types::{ControlKey, KeySym};

/// Look up the accumulated pattern. `None` means the sequence is not part of
/// the device's character set; the commit path treats that as a recoverable
/// miss.
pub fn lookup(pattern: &str) -> Option<KeySym> {
    let ch = match pattern {
        // Letters
        "01" => 'a',
        "1000" => 'b',
        "1010" => 'c',
        "100" => 'd',
        "0" => 'e',
        "0010" => 'f',
        "110" => 'g',
        "0000" => 'h',
        "00" => 'i',
        "0111" => 'j',
        "101" => 'k',
        "0100" => 'l',
        "11" => 'm',
        "10" => 'n',
        "111" => 'o',
        "0110" => 'p',
        "1101" => 'q',
        "010" => 'r',
        "000" => 's',
        "1" => 't',
        "001" => 'u',
        "0001" => 'v',
        "011" => 'w',
        "1001" => 'x',
        "1011" => 'y',
        "1100" => 'z',
        // Digits
        "01111" => '1',
        "00111" => '2',
        "00011" => '3',
        "00001" => '4',
        "00000" => '5',
        "10000" => '6',
        "11000" => '7',
        "11100" => '8',
        "11110" => '9',
        "11111" => '0',
        // Punctuation
        "011010" => '@',
        "01000" => '&',
        "101011" => '!',
        "001100" => '?',
        "111000" => ':',
        "101010" => ';',
        "010101" => '.',
        "110011" => ',',
        "011110" => '\'',
        "010010" => '"',
        "000000" => '^',
        "001101" => '_',
        "10101" => '\\',
        "110101" => '|',
        "11010" => '#',
        "011100" => '~',
        "10110" => '(',
        "101101" => ')',
        "10111" => '<',
        "101111" => '>',
        "01101" => '{',
        "011011" => '}',
        "01100" => '[',
        "011001" => ']',
        "11101" => '%',
        "00010" => '*',
        "01010" => '+',
        "10010" => '/',
        "100001" => '-',
        "10001" => '=',
        "100101" => '`',
        "000100" => '$',
        // Device controls: the 8-dit error prosign cancels out to Escape,
        // the SK closing prosign takes the screenshot.
        "00000000" => return Some(KeySym::Control(ControlKey::Escape)),
        "0001101" => return Some(KeySym::Control(ControlKey::PrintScreen)),
        _ => return None,
    };
    Some(KeySym::Char(ch))
}
