/// Known class codes as `(class, sub class, protocol, label)`; `None` matches any value.
///
/// See <http://www.usb.org/developers/defined_class>.
const CLASS_CODES: &[(u8, Option<u8>, Option<u8>, &str)] = &[
    (0x01, None, None, "Audio"),
    (0x02, None, None, "Comm"),
    (0x03, None, None, "HID"),
    (0x05, None, None, "Physical"),
    (0x06, Some(0x01), Some(0x01), "StillImaging"),
    (0x06, None, None, "Image"),
    (0x07, None, None, "Printer"),
    (0x08, Some(0x01), None, "MassStorage RBC Bulk-Only"),
    (0x08, Some(0x02), Some(0x50), "MassStorage ATAPI Bulk-Only"),
    (0x08, Some(0x03), Some(0x50), "MassStorage QIC-157 Bulk-Only"),
    (0x08, Some(0x04), None, "MassStorage UFI"),
    (0x08, Some(0x05), Some(0x50), "MassStorage SFF-8070i Bulk-Only"),
    (0x08, Some(0x06), Some(0x50), "MassStorage SCSI Bulk-Only"),
    (0x08, None, None, "MassStorage"),
    (0x09, Some(0x00), Some(0x00), "Full speed Hub"),
    (0x09, Some(0x00), Some(0x01), "Hi-speed Hub with single TT"),
    (0x09, Some(0x00), Some(0x02), "Hi-speed Hub with multiple TTs"),
    (0x09, None, None, "Hub"),
    (0x0a, None, None, "CDC"),
    (0x0b, None, None, "SmartCard"),
    (0x0d, Some(0x00), Some(0x00), "ContentSecurity"),
    (0x0e, None, None, "Video"),
    (0xdc, Some(0x01), Some(0x01), "Diagnostic USB2"),
    (0xdc, None, None, "Diagnostic"),
    (0xe0, Some(0x01), Some(0x01), "Bluetooth"),
    (0xe0, Some(0x01), Some(0x02), "UWB"),
    (0xe0, Some(0x01), Some(0x03), "RemoteNDIS"),
    (0xe0, Some(0x02), Some(0x01), "Host Wire Adapter Control/Data"),
    (0xe0, Some(0x02), Some(0x02), "Device Wire Adapter Control/Data"),
    (0xe0, Some(0x02), Some(0x03), "Device Wire Adapter Isochronous"),
    (0xe0, None, None, "Wireless Controller"),
    (0xef, Some(0x01), Some(0x01), "Active Sync"),
    (0xef, Some(0x01), Some(0x02), "Palm Sync"),
    (0xef, Some(0x02), Some(0x01), "Interface Association Descriptor"),
    (0xef, Some(0x02), Some(0x02), "Wire Adapter Multifunction Peripheral"),
    (0xef, Some(0x03), Some(0x01), "Cable Based Association Framework"),
    (0xef, None, None, "Miscellaneous"),
    (0xfe, Some(0x01), Some(0x01), "Device Firmware Upgrade"),
    (0xfe, Some(0x02), Some(0x00), "IRDA Bridge"),
    (0xfe, Some(0x03), Some(0x00), "USB Test and Measurement"),
    (0xfe, Some(0x03), Some(0x01), "USB Test and Measurement (USBTMC USB488)"),
    (0xfe, None, None, "Application Specific"),
    (0xff, None, None, "Vendor specific"),
];

fn lookup(matches: impl Fn(u8, Option<u8>, Option<u8>) -> bool) -> Option<&'static str> {
    CLASS_CODES
        .iter()
        .find(|&&(class, sub_class, protocol, _)| matches(class, sub_class, protocol))
        .map(|&(_, _, _, label)| label)
}

/// Describes a class/sub class/protocol triple in words.
///
/// The most specific entry wins. Fields the matching entry does not name are appended in hex:
///
/// ```
/// assert_eq!("MassStorage SCSI Bulk-Only", usbkit::dev_string(8, 6, 0x50));
/// assert_eq!("MassStorage UFI (00)", usbkit::dev_string(8, 4, 0));
/// assert_eq!("HID (01,02)", usbkit::dev_string(3, 1, 2));
/// assert_eq!("Unknown(42,01,02)", usbkit::dev_string(0x42, 1, 2));
/// ```
pub fn dev_string(base_class: u8, sub_class: u8, protocol: u8) -> String {
    if let Some(desc) = lookup(|c, s, p| {
        c == base_class && s == Some(sub_class) && p == Some(protocol)
    }) {
        desc.to_owned()
    } else if let Some(desc) =
        lookup(|c, s, p| c == base_class && s == Some(sub_class) && p.is_none())
    {
        format!("{} ({:02x})", desc, protocol)
    } else if let Some(desc) = lookup(|c, s, p| c == base_class && s.is_none() && p.is_none()) {
        format!("{} ({:02x},{:02x})", desc, sub_class, protocol)
    } else {
        format!(
            "Unknown({:02x},{:02x},{:02x})",
            base_class, sub_class, protocol
        )
    }
}
