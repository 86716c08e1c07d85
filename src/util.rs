// sftpfs is a pooled, backpressured SFTP virtual file-system adapter
// Copyright (C) 2025  Javier Lancha Vázquez <javier.lancha@gmail.com>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Small shared helpers. Grounded on the teacher's `utils` module (size
//! constants, human-readable formatting) but trimmed to what this crate uses.

#[allow(non_upper_case_globals)]
pub mod size {
    pub const KiB: u64 = 1024;
    pub const MiB: u64 = KiB * 1024;
    pub const GiB: u64 = MiB * 1024;
}

/// Formats a byte count for log/diagnostic messages.
pub fn format_size(bytes: u64) -> String {
    if bytes >= size::GiB {
        format!("{:.2} GiB", bytes as f64 / size::GiB as f64)
    } else if bytes >= size::MiB {
        format!("{:.2} MiB", bytes as f64 / size::MiB as f64)
    } else if bytes >= size::KiB {
        format!("{:.2} KiB", bytes as f64 / size::KiB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(42), "42 B");
        assert_eq!(format_size(2_048), "2.00 KiB");
        assert_eq!(format_size(5 * size::MiB), "5.00 MiB");
        assert_eq!(format_size(3 * size::GiB), "3.00 GiB");
    }
}
