use libusb1_sys::libusb_device_descriptor;

use crate::fields::Version;

/// Describes a device.
///
/// The descriptor is read once, when the device is enumerated, and never changes afterwards.
#[allow(non_snake_case)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    bLength: u8,
    bDescriptorType: u8,
    bcdUSB: u16,
    bDeviceClass: u8,
    bDeviceSubClass: u8,
    bDeviceProtocol: u8,
    bMaxPacketSize0: u8,
    idVendor: u16,
    idProduct: u16,
    bcdDevice: u16,
    iManufacturer: u8,
    iProduct: u8,
    iSerialNumber: u8,
    bNumConfigurations: u8,
}

impl DeviceDescriptor {
    /// Returns the size of the descriptor in bytes.
    pub fn length(&self) -> u8 {
        self.bLength
    }

    /// Returns the descriptor type, `0x01` for device descriptors.
    pub fn descriptor_type(&self) -> u8 {
        self.bDescriptorType
    }

    /// Returns the device's maximum supported USB version.
    pub fn usb_version(&self) -> Version {
        Version::from_bcd(self.bcdUSB)
    }

    /// Returns the raw `bcdUSB` field.
    pub fn bcd_usb(&self) -> u16 {
        self.bcdUSB
    }

    /// Returns the manufacturer's version of the device.
    pub fn device_version(&self) -> Version {
        Version::from_bcd(self.bcdDevice)
    }

    /// Returns the raw `bcdDevice` field.
    pub fn bcd_device(&self) -> u16 {
        self.bcdDevice
    }

    /// Returns the index of the string descriptor that contains the manufacturer name.
    pub fn manufacturer_string_index(&self) -> Option<u8> {
        match self.iManufacturer {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the index of the string descriptor that contains the product name.
    pub fn product_string_index(&self) -> Option<u8> {
        match self.iProduct {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the index of the string descriptor that contains the device's serial number.
    pub fn serial_number_string_index(&self) -> Option<u8> {
        match self.iSerialNumber {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the device's class code.
    pub fn class_code(&self) -> u8 {
        self.bDeviceClass
    }

    /// Returns the device's sub class code.
    pub fn sub_class_code(&self) -> u8 {
        self.bDeviceSubClass
    }

    /// Returns the device's protocol code.
    pub fn protocol_code(&self) -> u8 {
        self.bDeviceProtocol
    }

    /// Returns the device's vendor ID.
    pub fn vendor_id(&self) -> u16 {
        self.idVendor
    }

    /// Returns the device's product ID.
    pub fn product_id(&self) -> u16 {
        self.idProduct
    }

    /// Returns the maximum packet size of the device's first endpoint.
    pub fn max_packet_size(&self) -> u8 {
        self.bMaxPacketSize0
    }

    /// Returns the number of config descriptors available for the device.
    pub fn num_configurations(&self) -> u8 {
        self.bNumConfigurations
    }
}

#[doc(hidden)]
pub fn from_libusb(device: &libusb_device_descriptor) -> DeviceDescriptor {
    DeviceDescriptor {
        bLength: device.bLength,
        bDescriptorType: device.bDescriptorType,
        bcdUSB: device.bcdUSB,
        bDeviceClass: device.bDeviceClass,
        bDeviceSubClass: device.bDeviceSubClass,
        bDeviceProtocol: device.bDeviceProtocol,
        bMaxPacketSize0: device.bMaxPacketSize0,
        idVendor: device.idVendor,
        idProduct: device.idProduct,
        bcdDevice: device.bcdDevice,
        iManufacturer: device.iManufacturer,
        iProduct: device.iProduct,
        iSerialNumber: device.iSerialNumber,
        bNumConfigurations: device.bNumConfigurations,
    }
}
